//! SurrealDB implementation of [`SystemConfigRepository`].
//!
//! Rows are keyed by their config key: `system_config:⟨key⟩`.

use chrono::{DateTime, Utc};
use clinic_core::error::{ClinicError, ClinicResult};
use clinic_core::models::system_config::{SystemConfig, UpsertSystemConfig, VALUE_TYPES};
use clinic_core::repository::SystemConfigRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use super::first;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SystemConfigRow {
    key: String,
    value: String,
    value_type: String,
    category: String,
    description: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<SystemConfigRow> for SystemConfig {
    fn from(row: SystemConfigRow) -> Self {
        SystemConfig {
            key: row.key,
            value: row.value,
            value_type: row.value_type,
            category: row.category,
            description: row.description,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_CONFIG_BY_KEY: &str = "SELECT * FROM type::record('system_config', $key)";

/// SurrealDB implementation of the SystemConfig repository.
#[derive(Clone)]
pub struct SurrealSystemConfigRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSystemConfigRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SystemConfigRepository for SurrealSystemConfigRepository<C> {
    async fn get(&self, key: &str) -> ClinicResult<SystemConfig> {
        let mut result = self
            .db
            .query(SELECT_CONFIG_BY_KEY)
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SystemConfigRow> = result.take(0).map_err(DbError::from)?;
        Ok(first(rows, "system_config", key)?.into())
    }

    async fn list(&self) -> ClinicResult<Vec<SystemConfig>> {
        let mut result = self
            .db
            .query("SELECT * FROM system_config ORDER BY category ASC, key ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SystemConfigRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(SystemConfig::from).collect())
    }

    async fn upsert(&self, key: &str, input: UpsertSystemConfig) -> ClinicResult<SystemConfig> {
        if key.trim().is_empty() {
            return Err(ClinicError::invalid("key", "must not be empty"));
        }
        if !VALUE_TYPES.contains(&input.value_type.as_str()) {
            return Err(ClinicError::invalid(
                "value_type",
                format!("must be one of {}", VALUE_TYPES.join(", ")),
            ));
        }
        if !input.value_matches_type() {
            return Err(ClinicError::invalid(
                "value",
                format!("does not parse as {}", input.value_type),
            ));
        }

        let mut result = self
            .db
            .query(
                "UPSERT type::record('system_config', $key) SET \
                 key = $key, value = $value, value_type = $value_type, \
                 category = $category, description = $description, \
                 updated_at = time::now();",
            )
            .query(SELECT_CONFIG_BY_KEY)
            .bind(("key", key.to_string()))
            .bind(("value", input.value))
            .bind(("value_type", input.value_type))
            .bind(("category", input.category))
            .bind(("description", input.description))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<SystemConfigRow> = result.take(1).map_err(DbError::from)?;
        Ok(first(rows, "system_config", key)?.into())
    }

    async fn delete(&self, key: &str) -> ClinicResult<()> {
        self.db
            .query("DELETE type::record('system_config', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}
