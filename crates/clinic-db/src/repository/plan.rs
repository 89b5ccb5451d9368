//! SurrealDB implementation of [`PlanRepository`].

use chrono::{DateTime, Utc};
use clinic_core::error::ClinicResult;
use clinic_core::models::plan::{CreatePlan, Plan};
use clinic_core::repository::PlanRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{empty_object, first};
use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
struct PlanRow {
    record_id: String,
    name: String,
    slug: String,
    price_monthly: f64,
    price_yearly: f64,
    max_users: u32,
    max_clients: u32,
    max_storage_gb: u32,
    features: serde_json::Value,
    is_default: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlanRow {
    fn try_into_plan(self) -> Result<Plan, DbError> {
        Ok(Plan {
            id: parse_uuid("plan", &self.record_id)?,
            name: self.name,
            slug: self.slug,
            price_monthly: self.price_monthly,
            price_yearly: self.price_yearly,
            max_users: self.max_users,
            max_clients: self.max_clients,
            max_storage_gb: self.max_storage_gb,
            features: self.features,
            is_default: self.is_default,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_plans(rows: Vec<PlanRow>) -> Result<Vec<Plan>, DbError> {
    rows.into_iter().map(PlanRow::try_into_plan).collect()
}

/// SurrealDB implementation of the Plan repository.
#[derive(Clone)]
pub struct SurrealPlanRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPlanRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PlanRepository for SurrealPlanRepository<C> {
    async fn create(&self, input: CreatePlan) -> ClinicResult<Plan> {
        let id_str = Uuid::new_v4().to_string();

        let clear_default = if input.is_default {
            "UPDATE plan SET is_default = false, updated_at = time::now() \
             WHERE is_default = true; "
        } else {
            ""
        };
        let sql = format!(
            "BEGIN TRANSACTION; {clear_default}\
             CREATE type::record('plan', $id) SET \
             name = $name, slug = $slug, \
             price_monthly = $price_monthly, price_yearly = $price_yearly, \
             max_users = $max_users, max_clients = $max_clients, \
             max_storage_gb = $max_storage_gb, features = $features, \
             is_default = $is_default; \
             COMMIT TRANSACTION;"
        );

        let mut response = self
            .db
            .query(sql)
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("slug", input.slug))
            .bind(("price_monthly", input.price_monthly))
            .bind(("price_yearly", input.price_yearly))
            .bind(("max_users", input.max_users))
            .bind(("max_clients", input.max_clients))
            .bind(("max_storage_gb", input.max_storage_gb))
            .bind(("features", input.features.unwrap_or_else(empty_object)))
            .bind(("is_default", input.is_default))
            .await
            .map_err(DbError::from)?;
        if let Some(err) = DbError::from_statement_errors("plan", response.take_errors()) {
            return Err(err.into());
        }

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('plan', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<PlanRow> = result.take(0).map_err(DbError::from)?;
        Ok(first(rows, "plan", id_str)?.try_into_plan()?)
    }

    async fn get_by_slug(&self, slug: &str) -> ClinicResult<Plan> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM plan WHERE slug = $slug")
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PlanRow> = result.take(0).map_err(DbError::from)?;
        Ok(first(rows, "plan", format!("slug={slug}"))?.try_into_plan()?)
    }

    async fn get_default(&self) -> ClinicResult<Option<Plan>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM plan \
                 WHERE is_default = true AND is_active = true LIMIT 1",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PlanRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(PlanRow::try_into_plan).transpose()?)
    }

    async fn list(&self) -> ClinicResult<Vec<Plan>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM plan ORDER BY price_monthly ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PlanRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_plans(rows)?)
    }
}
