//! Scoped query builder for tenant-owned tables.
//!
//! Every filtered read, update or delete over a table that carries
//! `tenant_id` goes through [`ScopedQuery`]. Rendering fails with
//! [`DbError::Unscoped`] unless the caller attached a [`DataScope`] via
//! [`ScopedQuery::scoped`] or opted out explicitly via
//! [`ScopedQuery::global`]. `grep '\.global()'` lists every unscoped call
//! site. Only `CREATE` statements, which always set `tenant_id`, are
//! written by hand.

use clinic_core::repository::Pagination;
use clinic_core::scope::DataScope;
use serde_json::Value;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use crate::error::DbError;

/// A table whose rows belong to exactly one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantTable {
    pub name: &'static str,
    /// Column linking a row to a patient principal. Patient-scoped reads
    /// on tables without one are refused.
    pub patient_link: Option<&'static str>,
}

pub const PATIENTS: TenantTable = TenantTable {
    name: "patient",
    patient_link: Some("user_id"),
};

pub const MEMBERSHIPS: TenantTable = TenantTable {
    name: "membership",
    patient_link: None,
};

pub const AUDIT_LOGS: TenantTable = TenantTable {
    name: "audit_log",
    patient_link: None,
};

#[derive(Debug, Clone)]
enum Projection {
    Rows,
    Count,
    Update(String),
    Delete,
}

#[derive(Debug, Clone, Copy)]
enum Scoping {
    Unset,
    Scoped(DataScope),
    Global,
}

/// A rendered query with its parameter bindings.
#[derive(Debug, Clone)]
pub struct RenderedQuery {
    pub sql: String,
    pub binds: Vec<(&'static str, Value)>,
}

impl RenderedQuery {
    /// Join statements into one transaction. Parameters with the same
    /// name must carry the same value in every part.
    pub fn transaction(parts: impl IntoIterator<Item = RenderedQuery>) -> Self {
        let mut sql = String::from("BEGIN TRANSACTION; ");
        let mut binds: Vec<(&'static str, Value)> = Vec::new();
        for part in parts {
            sql.push_str(&part.sql);
            sql.push_str("; ");
            for (name, value) in part.binds {
                if !binds.iter().any(|(existing, _)| *existing == name) {
                    binds.push((name, value));
                }
            }
        }
        sql.push_str("COMMIT TRANSACTION;");
        Self { sql, binds }
    }

    /// Run every statement, mapping the first failure through
    /// [`DbError::from_statement_errors`].
    pub async fn execute<C: Connection>(self, db: &Surreal<C>, entity: &str) -> Result<(), DbError> {
        let mut query = db.query(self.sql);
        for bind in self.binds {
            query = query.bind(bind);
        }
        let mut response = query.await?;
        match DbError::from_statement_errors(entity, response.take_errors()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScopedQuery {
    table: TenantTable,
    projection: Projection,
    conditions: Vec<String>,
    binds: Vec<(&'static str, Value)>,
    order_by: Option<&'static str>,
    page: Option<Pagination>,
    scoping: Scoping,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

impl ScopedQuery {
    /// `SELECT meta::id(id) AS record_id, * FROM <table>`.
    pub fn select(table: TenantTable) -> Self {
        Self::new(table, Projection::Rows)
    }

    /// `SELECT count() AS total FROM <table> ... GROUP ALL`.
    pub fn count(table: TenantTable) -> Self {
        Self::new(table, Projection::Count)
    }

    /// `UPDATE <table> SET <assignments>`. Values referenced by the
    /// assignments are attached with [`ScopedQuery::bind`].
    pub fn update(table: TenantTable, assignments: &str) -> Self {
        Self::new(table, Projection::Update(assignments.to_string()))
    }

    /// `DELETE <table>`.
    pub fn delete(table: TenantTable) -> Self {
        Self::new(table, Projection::Delete)
    }

    fn new(table: TenantTable, projection: Projection) -> Self {
        Self {
            table,
            projection,
            conditions: Vec::new(),
            binds: Vec::new(),
            order_by: None,
            page: None,
            scoping: Scoping::Unset,
        }
    }

    /// Add a predicate. `condition` must reference `$param` for the value.
    pub fn filter(mut self, condition: &str, param: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(condition.to_string());
        self.binds.push((param, value.into()));
        self
    }

    /// Bind a parameter used outside the predicates.
    pub fn bind(mut self, param: &'static str, value: impl Into<Value>) -> Self {
        self.binds.push((param, value.into()));
        self
    }

    /// Add a predicate with no bound value.
    pub fn filter_raw(mut self, condition: &str) -> Self {
        self.conditions.push(condition.to_string());
        self
    }

    pub fn order_by(mut self, clause: &'static str) -> Self {
        self.order_by = Some(clause);
        self
    }

    pub fn paginate(mut self, pagination: &Pagination) -> Self {
        self.page = Some(pagination.clone());
        self
    }

    /// Restrict the query to the rows `scope` admits.
    pub fn scoped(mut self, scope: &DataScope) -> Self {
        self.scoping = Scoping::Scoped(*scope);
        self
    }

    /// Run without any tenant predicate. Super-admin paths only.
    pub fn global(mut self) -> Self {
        self.scoping = Scoping::Global;
        self
    }

    pub fn render(&self) -> Result<RenderedQuery, DbError> {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();

        match self.scoping {
            Scoping::Unset => return Err(DbError::Unscoped(self.table.name.to_string())),
            Scoping::Global | Scoping::Scoped(DataScope::Global) => {}
            Scoping::Scoped(DataScope::Tenant { tenant_id }) => {
                conditions.push("tenant_id = $scope_tenant_id".to_string());
                binds.push(("scope_tenant_id", Value::String(tenant_id.to_string())));
            }
            Scoping::Scoped(DataScope::Patient {
                tenant_id,
                principal_id,
            }) => {
                let link = self.table.patient_link.ok_or_else(|| {
                    DbError::Query(format!(
                        "table `{}` has no patient link; patient scope refused",
                        self.table.name
                    ))
                })?;
                conditions.push("tenant_id = $scope_tenant_id".to_string());
                conditions.push(format!("{link} = $scope_principal_id"));
                binds.push(("scope_tenant_id", Value::String(tenant_id.to_string())));
                binds.push((
                    "scope_principal_id",
                    Value::String(principal_id.to_string()),
                ));
            }
        }

        conditions.extend(self.conditions.iter().cloned());
        binds.extend(self.binds.iter().cloned());

        let mut sql = match &self.projection {
            Projection::Rows => format!("SELECT meta::id(id) AS record_id, * FROM {}", self.table.name),
            Projection::Count => format!("SELECT count() AS total FROM {}", self.table.name),
            Projection::Update(assignments) => {
                format!("UPDATE {} SET {assignments}", self.table.name)
            }
            Projection::Delete => format!("DELETE {}", self.table.name),
        };
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        match self.projection {
            Projection::Update(_) | Projection::Delete => {}
            Projection::Count => sql.push_str(" GROUP ALL"),
            Projection::Rows => {
                if let Some(order) = self.order_by {
                    sql.push_str(" ORDER BY ");
                    sql.push_str(order);
                }
                if let Some(page) = &self.page {
                    sql.push_str(" LIMIT $limit START $offset");
                    binds.push(("limit", Value::from(page.limit)));
                    binds.push(("offset", Value::from(page.offset)));
                }
            }
        }

        Ok(RenderedQuery { sql, binds })
    }

    /// Execute a row query.
    pub async fn fetch<C: Connection, T: SurrealValue>(
        &self,
        db: &Surreal<C>,
    ) -> Result<Vec<T>, DbError> {
        let rendered = self.render()?;
        let mut query = db.query(rendered.sql);
        for bind in rendered.binds {
            query = query.bind(bind);
        }
        let mut result = query.await?.check().map_err(|e| DbError::Query(e.to_string()))?;
        Ok(result.take(0)?)
    }

    /// Execute an update or delete.
    pub async fn execute<C: Connection>(&self, db: &Surreal<C>, entity: &str) -> Result<(), DbError> {
        self.render()?.execute(db, entity).await
    }

    /// Execute a count query.
    pub async fn fetch_count<C: Connection>(&self, db: &Surreal<C>) -> Result<u64, DbError> {
        let rows: Vec<CountRow> = self.fetch(db).await?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
