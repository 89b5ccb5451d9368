//! SurrealDB implementation of [`MembershipRepository`].
//!
//! At most one membership per principal is the default. Writers keep that
//! invariant transactionally; the `membership_single_default` table event
//! rejects any write that would break it regardless of the path taken.

use chrono::{DateTime, Utc};
use clinic_core::error::{ClinicError, ClinicResult};
use clinic_core::models::membership::{CreateMembership, Membership};
use clinic_core::models::role::Role;
use clinic_core::repository::{MembershipRepository, PaginatedResult, Pagination, TenantMember};
use clinic_core::scope::DataScope;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::user::{SELECT_USER_BY_ID, UserRow};
use super::{first, parse_role};
use crate::error::{DbError, parse_opt_uuid, parse_uuid};
use crate::scoped::{MEMBERSHIPS, RenderedQuery, ScopedQuery};

#[derive(Debug, SurrealValue)]
pub(crate) struct MembershipRow {
    record_id: String,
    user_id: String,
    tenant_id: String,
    role: String,
    is_active: bool,
    is_default: bool,
    joined_at: DateTime<Utc>,
    last_access_at: Option<DateTime<Utc>>,
    invited_by: Option<String>,
}

impl MembershipRow {
    pub(crate) fn try_into_membership(self) -> Result<Membership, DbError> {
        Ok(Membership {
            id: parse_uuid("membership", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            role: parse_role(&self.role)?,
            is_active: self.is_active,
            is_default: self.is_default,
            joined_at: self.joined_at,
            last_access_at: self.last_access_at,
            invited_by: parse_opt_uuid("invited_by", self.invited_by.as_deref())?,
        })
    }
}

fn membership_key(user_id: Uuid, tenant_id: Uuid) -> String {
    format!("user={user_id},tenant={tenant_id}")
}

fn in_tenant(tenant_id: Uuid) -> DataScope {
    DataScope::Tenant { tenant_id }
}

/// `SELECT` of one membership by record id, bounded to its tenant.
pub(crate) fn select_by_id(id: Uuid, tenant_id: Uuid) -> ScopedQuery {
    ScopedQuery::select(MEMBERSHIPS)
        .filter(
            "id = type::record('membership', $membership_id)",
            "membership_id",
            id.to_string(),
        )
        .scoped(&in_tenant(tenant_id))
}

/// Memberships of one principal across every tenant.
fn of_principal(query: ScopedQuery, user_id: Uuid) -> ScopedQuery {
    query
        .filter("user_id = $user_id", "user_id", user_id.to_string())
        .global()
}

/// The membership linking `user_id` to `tenant_id`.
fn of_pair(query: ScopedQuery, user_id: Uuid, tenant_id: Uuid) -> ScopedQuery {
    query
        .filter("user_id = $user_id", "user_id", user_id.to_string())
        .scoped(&in_tenant(tenant_id))
}

/// Clears every default flag of `user_id`.
pub(crate) fn clear_default(user_id: Uuid) -> ScopedQuery {
    of_principal(
        ScopedQuery::update(MEMBERSHIPS, "is_default = false").filter_raw("is_default = true"),
        user_id,
    )
}

fn ensure_membership_role(role: Role) -> ClinicResult<()> {
    if role.is_membership_role() {
        Ok(())
    } else {
        Err(ClinicError::invalid(
            "role",
            "superadmin is a global role and cannot be granted per tenant",
        ))
    }
}

/// SurrealDB implementation of the Membership repository.
#[derive(Clone)]
pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn create(&self, input: CreateMembership) -> ClinicResult<Membership> {
        ensure_membership_role(input.role)?;
        let id = Uuid::new_v4();

        let clear = if input.is_default {
            Some(clear_default(input.user_id).render()?)
        } else {
            None
        };
        let clear_sql = clear
            .as_ref()
            .map(|c| format!("{}; ", c.sql))
            .unwrap_or_default();
        let sql = format!(
            "BEGIN TRANSACTION; {clear_sql}\
             CREATE type::record('membership', $id) SET \
             user_id = $user_id, tenant_id = $tenant_id, role = $role, \
             is_default = $is_default, invited_by = $invited_by; \
             COMMIT TRANSACTION;"
        );

        let mut query = self.db.query(sql);
        for bind in clear.map(|c| c.binds).unwrap_or_default() {
            query = query.bind(bind);
        }
        let mut response = query
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("role", input.role.as_str()))
            .bind(("is_default", input.is_default))
            .bind(("invited_by", input.invited_by.map(|u| u.to_string())))
            .await
            .map_err(DbError::from)?;
        if let Some(err) = DbError::from_statement_errors("membership", response.take_errors()) {
            return Err(err.into());
        }

        let rows: Vec<MembershipRow> = select_by_id(id, input.tenant_id).fetch(&self.db).await?;
        Ok(first(rows, "membership", id)?.try_into_membership()?)
    }

    async fn get(&self, user_id: Uuid, tenant_id: Uuid) -> ClinicResult<Membership> {
        let rows: Vec<MembershipRow> = of_pair(ScopedQuery::select(MEMBERSHIPS), user_id, tenant_id)
            .fetch(&self.db)
            .await?;
        Ok(first(rows, "membership", membership_key(user_id, tenant_id))?.try_into_membership()?)
    }

    async fn list_for_user(&self, user_id: Uuid) -> ClinicResult<Vec<Membership>> {
        let rows: Vec<MembershipRow> = of_principal(ScopedQuery::select(MEMBERSHIPS), user_id)
            .order_by("joined_at ASC")
            .fetch(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(MembershipRow::try_into_membership)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn list_members(
        &self,
        scope: &DataScope,
        pagination: Pagination,
    ) -> ClinicResult<PaginatedResult<TenantMember>> {
        let total = ScopedQuery::count(MEMBERSHIPS)
            .scoped(scope)
            .fetch_count(&self.db)
            .await?;

        let rows: Vec<MembershipRow> = ScopedQuery::select(MEMBERSHIPS)
            .scoped(scope)
            .order_by("joined_at ASC")
            .paginate(&pagination)
            .fetch(&self.db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let membership = row.try_into_membership()?;
            let mut result = self
                .db
                .query(SELECT_USER_BY_ID)
                .bind(("id", membership.user_id.to_string()))
                .await
                .map_err(DbError::from)?;
            let users: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
            let user = first(users, "user", membership.user_id)?.try_into_user()?;
            items.push(TenantMember { user, membership });
        }

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn update_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> ClinicResult<Membership> {
        ensure_membership_role(role)?;
        // Existence check first so a missing pair surfaces as NotFound.
        self.get(user_id, tenant_id).await?;

        of_pair(
            ScopedQuery::update(MEMBERSHIPS, "role = $role").bind("role", role.as_str()),
            user_id,
            tenant_id,
        )
        .execute(&self.db, "membership")
        .await?;
        self.get(user_id, tenant_id).await
    }

    async fn set_active(&self, tenant_id: Uuid, user_id: Uuid, is_active: bool) -> ClinicResult<()> {
        self.get(user_id, tenant_id).await?;

        of_pair(
            ScopedQuery::update(MEMBERSHIPS, "is_active = $is_active").bind("is_active", is_active),
            user_id,
            tenant_id,
        )
        .execute(&self.db, "membership")
        .await?;
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, user_id: Uuid) -> ClinicResult<()> {
        self.get(user_id, tenant_id).await?;

        of_pair(ScopedQuery::delete(MEMBERSHIPS), user_id, tenant_id)
            .execute(&self.db, "membership")
            .await?;
        Ok(())
    }

    async fn set_default(&self, user_id: Uuid, tenant_id: Uuid) -> ClinicResult<()> {
        let target = self.get(user_id, tenant_id).await?;
        if !target.is_active {
            return Err(ClinicError::invalid(
                "tenant_id",
                "an inactive membership cannot be the default",
            ));
        }
        if target.is_default {
            return Ok(());
        }

        let mark = of_pair(
            ScopedQuery::update(MEMBERSHIPS, "is_default = true"),
            user_id,
            tenant_id,
        );
        RenderedQuery::transaction([clear_default(user_id).render()?, mark.render()?])
            .execute(&self.db, "membership")
            .await?;

        debug!(%user_id, %tenant_id, "Default membership switched");
        Ok(())
    }

    async fn touch_last_access(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> ClinicResult<()> {
        of_pair(
            ScopedQuery::update(MEMBERSHIPS, "last_access_at = <datetime>$at")
                .bind("at", at.to_rfc3339()),
            user_id,
            tenant_id,
        )
        .execute(&self.db, "membership")
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_tenant_helpers_carry_the_tenant_predicate() {
        let (user, tenant) = (Uuid::new_v4(), Uuid::new_v4());

        for query in [
            select_by_id(Uuid::new_v4(), tenant),
            of_pair(ScopedQuery::select(MEMBERSHIPS), user, tenant),
            of_pair(ScopedQuery::delete(MEMBERSHIPS), user, tenant),
        ] {
            let rendered = query.render().unwrap();
            assert!(rendered.sql.contains("tenant_id = $scope_tenant_id"), "{}", rendered.sql);
        }

        let cleared = clear_default(user).render().unwrap();
        assert_eq!(
            cleared.sql,
            "UPDATE membership SET is_default = false \
             WHERE is_default = true AND user_id = $user_id"
        );
    }
}
