//! SurrealDB implementation of [`UserRepository`].
//!
//! Emails are normalized before every write and lookup so the unique
//! index on `user.email` is case-insensitive. Password digests arrive
//! already computed by the credential service.

use chrono::{DateTime, Utc};
use clinic_core::error::ClinicResult;
use clinic_core::models::user::{CreateUser, UpdateUser, User, normalize_email};
use clinic_core::repository::{PaginatedResult, Pagination, UserRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, IdRow, first, parse_role};
use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
pub(crate) struct UserRow {
    record_id: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    locale: String,
    role: String,
    is_active: bool,
    tokens_invalidated_after: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) fn try_into_user(self) -> Result<User, DbError> {
        Ok(User {
            id: parse_uuid("user", &self.record_id)?,
            email: self.email,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            locale: self.locale,
            role: parse_role(&self.role)?,
            is_active: self.is_active,
            tokens_invalidated_after: self.tokens_invalidated_after,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const SELECT_USER_BY_ID: &str =
    "SELECT meta::id(id) AS record_id, * FROM type::record('user', $id)";

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> ClinicResult<User> {
        let id_str = Uuid::new_v4().to_string();
        let email = normalize_email(&input.email);

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 email = $email, password_hash = $password_hash, \
                 first_name = $first_name, last_name = $last_name, \
                 phone = $phone, locale = $locale, role = $role; ",
            )
            .query(SELECT_USER_BY_ID)
            .bind(("id", id_str.clone()))
            .bind(("email", email))
            .bind(("password_hash", input.password_hash))
            .bind(("first_name", input.first_name))
            .bind(("last_name", input.last_name))
            .bind(("phone", input.phone))
            .bind(("locale", input.locale.unwrap_or_else(|| "es".into())))
            .bind(("role", input.role.as_str()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_check("user", e))?;

        let rows: Vec<UserRow> = result.take(1).map_err(DbError::from)?;
        Ok(first(rows, "user", id_str)?.try_into_user()?)
    }

    async fn get_by_id(&self, id: Uuid) -> ClinicResult<User> {
        let mut result = self
            .db
            .query(SELECT_USER_BY_ID)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        Ok(first(rows, "user", id)?.try_into_user()?)
    }

    async fn get_by_email(&self, email: &str) -> ClinicResult<User> {
        let email = normalize_email(email);

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM user WHERE email = $email")
            .bind(("email", email.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        Ok(first(rows, "user", format!("email={email}"))?.try_into_user()?)
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> ClinicResult<User> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.first_name.is_some() {
            sets.push("first_name = $first_name");
        }
        if input.last_name.is_some() {
            sets.push("last_name = $last_name");
        }
        if input.phone.is_some() {
            sets.push("phone = $phone");
        }
        if input.locale.is_some() {
            sets.push("locale = $locale");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('user', $id) SET {}; {SELECT_USER_BY_ID}",
            sets.join(", ")
        );

        let mut builder = self.db.query(query).bind(("id", id_str.clone()));
        if let Some(first_name) = input.first_name {
            builder = builder.bind(("first_name", first_name));
        }
        if let Some(last_name) = input.last_name {
            builder = builder.bind(("last_name", last_name));
        }
        if let Some(phone) = input.phone {
            builder = builder.bind(("phone", phone));
        }
        if let Some(locale) = input.locale {
            builder = builder.bind(("locale", locale));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_check("user", e))?;

        let rows: Vec<UserRow> = result.take(1).map_err(DbError::from)?;
        Ok(first(rows, "user", id_str)?.try_into_user()?)
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: String,
        invalidate_tokens: bool,
    ) -> ClinicResult<()> {
        let query = if invalidate_tokens {
            "UPDATE type::record('user', $id) SET password_hash = $password_hash, \
             tokens_invalidated_after = time::now(), updated_at = time::now(); \
             SELECT meta::id(id) AS record_id FROM type::record('user', $id)"
        } else {
            "UPDATE type::record('user', $id) SET password_hash = $password_hash, \
             updated_at = time::now(); \
             SELECT meta::id(id) AS record_id FROM type::record('user', $id)"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let updated: Vec<IdRow> = result.take(1).map_err(DbError::from)?;
        if updated.is_empty() {
            return Err(DbError::not_found("user", id).into());
        }
        Ok(())
    }

    async fn restore_credentials(
        &self,
        id: Uuid,
        password_hash: String,
        tokens_invalidated_after: Option<DateTime<Utc>>,
    ) -> ClinicResult<()> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET password_hash = $password_hash, \
                 tokens_invalidated_after = $tokens_invalidated_after, \
                 updated_at = time::now(); \
                 SELECT meta::id(id) AS record_id FROM type::record('user', $id)",
            )
            .bind(("id", id.to_string()))
            .bind(("password_hash", password_hash))
            .bind(("tokens_invalidated_after", tokens_invalidated_after))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let updated: Vec<IdRow> = result.take(1).map_err(DbError::from)?;
        if updated.is_empty() {
            return Err(DbError::not_found("user", id).into());
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> ClinicResult<()> {
        self.get_by_id(id).await?;
        self.db
            .query("DELETE type::record('user', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> ClinicResult<PaginatedResult<User>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM user GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
