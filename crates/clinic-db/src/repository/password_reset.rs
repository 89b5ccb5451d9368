//! SurrealDB implementation of [`PasswordResetRepository`].

use chrono::{DateTime, Utc};
use clinic_core::error::{ClinicError, ClinicResult};
use clinic_core::models::password_reset::{CreatePasswordReset, PasswordReset};
use clinic_core::repository::PasswordResetRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::first;
use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
struct PasswordResetRow {
    record_id: String,
    user_id: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl PasswordResetRow {
    fn try_into_reset(self) -> Result<PasswordReset, DbError> {
        Ok(PasswordReset {
            id: parse_uuid("password_reset", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            token_hash: self.token_hash,
            expires_at: self.expires_at,
            used_at: self.used_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct UsedRow {
    #[allow(dead_code)]
    used_at: Option<DateTime<Utc>>,
}

/// SurrealDB implementation of the PasswordReset repository.
#[derive(Clone)]
pub struct SurrealPasswordResetRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPasswordResetRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PasswordResetRepository for SurrealPasswordResetRepository<C> {
    async fn create(&self, input: CreatePasswordReset) -> ClinicResult<PasswordReset> {
        let id_str = Uuid::new_v4().to_string();

        let mut result = self
            .db
            .query(
                "CREATE type::record('password_reset', $id) SET \
                 user_id = $user_id, token_hash = $token_hash, \
                 expires_at = $expires_at;",
            )
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('password_reset', $id)")
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("token_hash", input.token_hash))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_check("password_reset", e))?;

        let rows: Vec<PasswordResetRow> = result.take(1).map_err(DbError::from)?;
        Ok(first(rows, "password_reset", id_str)?.try_into_reset()?)
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> ClinicResult<PasswordReset> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM password_reset \
                 WHERE token_hash = $token_hash",
            )
            .bind(("token_hash", token_hash.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PasswordResetRow> = result.take(0).map_err(DbError::from)?;
        // The hash is never echoed back in errors.
        Ok(first(rows, "password_reset", "token")?.try_into_reset()?)
    }

    /// Consumes the token. A second call for the same id is a conflict,
    /// so concurrent confirmations cannot both succeed.
    async fn mark_used(&self, id: Uuid) -> ClinicResult<()> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('password_reset', $id) SET used_at = time::now() \
                 WHERE used_at = NONE RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let updated: Vec<UsedRow> = result.take(0).map_err(DbError::from)?;
        if updated.is_empty() {
            return Err(ClinicError::conflict("password_reset"));
        }
        Ok(())
    }

    async fn release(&self, id: Uuid) -> ClinicResult<()> {
        self.db
            .query("UPDATE type::record('password_reset', $id) SET used_at = NONE")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> ClinicResult<()> {
        self.db
            .query("DELETE type::record('password_reset', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}
