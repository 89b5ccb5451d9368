//! SurrealDB implementation of [`TenantRepository`].

use chrono::{DateTime, Utc};
use clinic_core::error::{ClinicError, ClinicResult};
use clinic_core::models::tenant::{CreateTenant, Tenant, UpdateTenant};
use clinic_core::models::user::{User, normalize_email};
use clinic_core::repository::{
    OnboardedTenant, PaginatedResult, Pagination, TenantAdminSeed, TenantRepository,
};
use clinic_core::scope::DataScope;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::membership::{self, MembershipRow};
use super::user::{SELECT_USER_BY_ID, UserRow};
use super::{CountRow, empty_object, first};
use crate::error::{DbError, parse_uuid};
use crate::scoped::{MEMBERSHIPS, RenderedQuery, ScopedQuery};

#[derive(Debug, SurrealValue)]
pub(crate) struct TenantRow {
    record_id: String,
    name: String,
    slug: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    logo_url: Option<String>,
    primary_color: Option<String>,
    settings: serde_json::Value,
    plan: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRow {
    pub(crate) fn try_into_tenant(self) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id: parse_uuid("tenant", &self.record_id)?,
            name: self.name,
            slug: self.slug,
            email: self.email,
            phone: self.phone,
            address: self.address,
            logo_url: self.logo_url,
            primary_color: self.primary_color,
            settings: self.settings,
            plan: self.plan,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_TENANT_BY_ID: &str =
    "SELECT meta::id(id) AS record_id, * FROM type::record('tenant', $id)";

/// SurrealDB implementation of the Tenant repository.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM user WHERE email = $email")
            .bind(("email", email.to_string()))
            .await?;
        let rows: Vec<UserRow> = result.take(0)?;
        rows.into_iter().next().map(UserRow::try_into_user).transpose()
    }

    async fn has_default_membership(&self, user_id: Uuid) -> Result<bool, DbError> {
        let defaults = ScopedQuery::count(MEMBERSHIPS)
            .filter("user_id = $user_id", "user_id", user_id.to_string())
            .filter_raw("is_default = true")
            .global()
            .fetch_count(&self.db)
            .await?;
        Ok(defaults > 0)
    }

    async fn member_count(&self, tenant_id: Uuid) -> Result<u64, DbError> {
        ScopedQuery::count(MEMBERSHIPS)
            .scoped(&DataScope::Tenant { tenant_id })
            .fetch_count(&self.db)
            .await
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create_with_admin(
        &self,
        input: CreateTenant,
        admin: TenantAdminSeed,
    ) -> ClinicResult<OnboardedTenant> {
        input.validate()?;

        let admin_email = normalize_email(&admin.email);
        let existing = self.find_user_by_email(&admin_email).await?;
        if existing.as_ref().is_some_and(User::is_superadmin) {
            return Err(ClinicError::invalid(
                "admin_email",
                "the super-administrator cannot hold tenant memberships",
            ));
        }

        let tenant_id = Uuid::new_v4();
        let membership_id = Uuid::new_v4();
        let (user_id, admin_created, is_default) = match &existing {
            Some(user) => (user.id, false, !self.has_default_membership(user.id).await?),
            None => (Uuid::new_v4(), true, true),
        };

        let mut sql = String::from(
            "BEGIN TRANSACTION; \
             CREATE type::record('tenant', $tenant_id) SET \
             name = $name, slug = $slug, email = $email, phone = $phone, \
             address = $address, logo_url = $logo_url, \
             primary_color = $primary_color, settings = $settings, plan = $plan; ",
        );
        if admin_created {
            sql.push_str(
                "CREATE type::record('user', $user_id) SET \
                 email = $admin_email, password_hash = $password_hash, \
                 first_name = $first_name, last_name = $last_name, \
                 role = 'tenant_admin'; ",
            );
        }
        sql.push_str(
            "CREATE type::record('membership', $membership_id) SET \
             user_id = $user_id, tenant_id = $tenant_id, role = 'tenant_admin', \
             is_default = $is_default, invited_by = $invited_by; \
             COMMIT TRANSACTION;",
        );

        let mut response = self
            .db
            .query(sql)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("name", input.name))
            .bind(("slug", input.slug))
            .bind(("email", input.email))
            .bind(("phone", input.phone))
            .bind(("address", input.address))
            .bind(("logo_url", input.logo_url))
            .bind(("primary_color", input.primary_color))
            .bind(("settings", input.settings.unwrap_or_else(empty_object)))
            .bind(("plan", input.plan.unwrap_or_else(|| "basic".into())))
            .bind(("user_id", user_id.to_string()))
            .bind(("admin_email", admin_email))
            .bind(("password_hash", admin.password_hash))
            .bind(("first_name", admin.first_name))
            .bind(("last_name", admin.last_name))
            .bind(("membership_id", membership_id.to_string()))
            .bind(("is_default", is_default))
            .bind(("invited_by", admin.invited_by.map(|u| u.to_string())))
            .await
            .map_err(DbError::from)?;
        if let Some(err) = DbError::from_statement_errors("tenant", response.take_errors()) {
            return Err(err.into());
        }

        info!(%tenant_id, %user_id, admin_created, "Tenant onboarded");

        let tenant = self.get_by_id(tenant_id).await?;

        let mut result = self
            .db
            .query(SELECT_USER_BY_ID)
            .bind(("id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let users: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let admin = first(users, "user", user_id)?.try_into_user()?;

        let memberships: Vec<MembershipRow> = membership::select_by_id(membership_id, tenant_id)
            .fetch(&self.db)
            .await?;
        let membership = first(memberships, "membership", membership_id)?.try_into_membership()?;

        Ok(OnboardedTenant {
            tenant,
            admin,
            membership,
            admin_created,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> ClinicResult<Tenant> {
        let mut result = self
            .db
            .query(SELECT_TENANT_BY_ID)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        Ok(first(rows, "tenant", id)?.try_into_tenant()?)
    }

    async fn get_by_slug(&self, slug: &str) -> ClinicResult<Tenant> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM tenant WHERE slug = $slug")
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        Ok(first(rows, "tenant", format!("slug={slug}"))?.try_into_tenant()?)
    }

    async fn update(&self, id: Uuid, input: UpdateTenant) -> ClinicResult<Tenant> {
        input.validate()?;
        let current = self.get_by_id(id).await?;

        if let Some(slug) = &input.slug
            && *slug != current.slug
            && self.member_count(id).await? > 0
        {
            return Err(ClinicError::invalid(
                "slug",
                "slug cannot change once the tenant has members",
            ));
        }

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.slug.is_some() {
            sets.push("slug = $slug");
        }
        if input.email.is_some() {
            sets.push("email = $email");
        }
        if input.phone.is_some() {
            sets.push("phone = $phone");
        }
        if input.address.is_some() {
            sets.push("address = $address");
        }
        if input.logo_url.is_some() {
            sets.push("logo_url = $logo_url");
        }
        if input.primary_color.is_some() {
            sets.push("primary_color = $primary_color");
        }
        if input.settings.is_some() {
            sets.push("settings = $settings");
        }
        if input.plan.is_some() {
            sets.push("plan = $plan");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('tenant', $id) SET {}; {SELECT_TENANT_BY_ID}",
            sets.join(", ")
        );

        let mut builder = self.db.query(query).bind(("id", id.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(slug) = input.slug {
            builder = builder.bind(("slug", slug));
        }
        if let Some(email) = input.email {
            builder = builder.bind(("email", email));
        }
        if let Some(phone) = input.phone {
            builder = builder.bind(("phone", phone));
        }
        if let Some(address) = input.address {
            builder = builder.bind(("address", address));
        }
        if let Some(logo_url) = input.logo_url {
            builder = builder.bind(("logo_url", logo_url));
        }
        if let Some(primary_color) = input.primary_color {
            builder = builder.bind(("primary_color", primary_color));
        }
        if let Some(settings) = input.settings {
            builder = builder.bind(("settings", settings));
        }
        if let Some(plan) = input.plan {
            builder = builder.bind(("plan", plan));
        }

        let mut result = builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_check("tenant", e))?;

        let rows: Vec<TenantRow> = result.take(1).map_err(DbError::from)?;
        Ok(first(rows, "tenant", id)?.try_into_tenant()?)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> ClinicResult<Tenant> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 is_active = $is_active, updated_at = time::now();",
            )
            .query(SELECT_TENANT_BY_ID)
            .bind(("id", id.to_string()))
            .bind(("is_active", is_active))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<TenantRow> = result.take(1).map_err(DbError::from)?;
        Ok(first(rows, "tenant", id)?.try_into_tenant()?)
    }

    async fn delete_onboarded(&self, onboarded: &OnboardedTenant) -> ClinicResult<()> {
        let tenant_id = onboarded.tenant.id;
        let mut parts = vec![
            ScopedQuery::delete(MEMBERSHIPS)
                .scoped(&DataScope::Tenant { tenant_id })
                .render()?,
        ];
        if onboarded.admin_created {
            parts.push(RenderedQuery {
                sql: "DELETE type::record('user', $admin_id)".into(),
                binds: vec![("admin_id", onboarded.admin.id.to_string().into())],
            });
        }
        parts.push(RenderedQuery {
            sql: "DELETE type::record('tenant', $tenant_id)".into(),
            binds: vec![("tenant_id", tenant_id.to_string().into())],
        });
        RenderedQuery::transaction(parts)
            .execute(&self.db, "tenant")
            .await?;

        info!(%tenant_id, "Tenant onboarding undone");
        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> ClinicResult<PaginatedResult<Tenant>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM tenant GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM tenant \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(TenantRow::try_into_tenant)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
