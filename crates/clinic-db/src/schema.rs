//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enumerated columns are strings with
//! ASSERT constraints; the authoritative label list of each enumerated
//! type lives in `enum_type` and is only rewritten by the role-schema
//! evolver.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;
use crate::role_evolver;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    name: String,
}

enum Step {
    Sql(&'static str),
    /// Role-schema revision applied through the evolver's rebuild protocol.
    RoleRevision(&'static str),
}

struct Migration {
    version: u32,
    name: &'static str,
    step: Step,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        step: Step::Sql(SCHEMA_V1),
    },
    Migration {
        version: 2,
        name: "a1b2c3d4e5f6",
        step: Step::RoleRevision("a1b2c3d4e5f6"),
    },
];

// -----------------------------------------------------------------------
// Schema v1: initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Enumerated types
-- =======================================================================
DEFINE TABLE enum_type SCHEMAFULL;
DEFINE FIELD name ON TABLE enum_type TYPE string;
DEFINE FIELD labels ON TABLE enum_type TYPE array<string>;
DEFINE INDEX idx_enum_type_name ON TABLE enum_type COLUMNS name UNIQUE;
CREATE enum_type:userrole SET name = 'userrole', labels = ['superadmin', \
    'tenant_admin', 'manager', 'medico', 'client', 'recepcionista', 'patient'];

-- =======================================================================
-- Users (global scope)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD first_name ON TABLE user TYPE string;
DEFINE FIELD last_name ON TABLE user TYPE string;
DEFINE FIELD phone ON TABLE user TYPE option<string>;
DEFINE FIELD locale ON TABLE user TYPE string DEFAULT 'es';
DEFINE FIELD role ON TABLE user TYPE string \
    ASSERT $value IN ['superadmin', 'tenant_admin', 'manager', 'medico', \
    'client', 'recepcionista', 'patient'];
DEFINE FIELD is_active ON TABLE user TYPE bool DEFAULT true;
DEFINE FIELD tokens_invalidated_after ON TABLE user TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE user TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;

-- =======================================================================
-- Tenants (global scope)
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD slug ON TABLE tenant TYPE string;
DEFINE FIELD email ON TABLE tenant TYPE option<string>;
DEFINE FIELD phone ON TABLE tenant TYPE option<string>;
DEFINE FIELD address ON TABLE tenant TYPE option<string>;
DEFINE FIELD logo_url ON TABLE tenant TYPE option<string>;
DEFINE FIELD primary_color ON TABLE tenant TYPE option<string>;
DEFINE FIELD settings ON TABLE tenant TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD plan ON TABLE tenant TYPE string DEFAULT 'basic';
DEFINE FIELD is_active ON TABLE tenant TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE tenant TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_tenant_slug ON TABLE tenant COLUMNS slug UNIQUE;

-- =======================================================================
-- Memberships (principal <-> tenant, per-tenant role)
-- =======================================================================
DEFINE TABLE membership SCHEMAFULL;
DEFINE FIELD user_id ON TABLE membership TYPE string;
DEFINE FIELD tenant_id ON TABLE membership TYPE string;
DEFINE FIELD role ON TABLE membership TYPE string \
    ASSERT $value IN ['superadmin', 'tenant_admin', 'manager', 'medico', \
    'client', 'recepcionista', 'patient'] AND $value != 'superadmin';
DEFINE FIELD is_active ON TABLE membership TYPE bool DEFAULT true;
DEFINE FIELD is_default ON TABLE membership TYPE bool DEFAULT false;
DEFINE FIELD joined_at ON TABLE membership TYPE datetime DEFAULT time::now();
DEFINE FIELD last_access_at ON TABLE membership TYPE option<datetime>;
DEFINE FIELD invited_by ON TABLE membership TYPE option<string>;
DEFINE INDEX idx_membership_user_tenant ON TABLE membership \
    COLUMNS user_id, tenant_id UNIQUE;
DEFINE INDEX idx_membership_tenant ON TABLE membership COLUMNS tenant_id;
DEFINE EVENT membership_single_default ON TABLE membership \
    WHEN $event != 'DELETE' AND $after.is_default = true \
    THEN { \
        IF count(SELECT id FROM membership \
            WHERE user_id = $after.user_id AND is_default = true) > 1 { \
            THROW 'membership: at most one default membership per principal'; \
        }; \
    };

-- =======================================================================
-- Plans & system configuration (global scope)
-- =======================================================================
DEFINE TABLE plan SCHEMAFULL;
DEFINE FIELD name ON TABLE plan TYPE string;
DEFINE FIELD slug ON TABLE plan TYPE string;
DEFINE FIELD price_monthly ON TABLE plan TYPE float DEFAULT 0.0;
DEFINE FIELD price_yearly ON TABLE plan TYPE float DEFAULT 0.0;
DEFINE FIELD max_users ON TABLE plan TYPE int;
DEFINE FIELD max_clients ON TABLE plan TYPE int;
DEFINE FIELD max_storage_gb ON TABLE plan TYPE int;
DEFINE FIELD features ON TABLE plan TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD is_default ON TABLE plan TYPE bool DEFAULT false;
DEFINE FIELD is_active ON TABLE plan TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE plan TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE plan TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_plan_slug ON TABLE plan COLUMNS slug UNIQUE;

DEFINE TABLE system_config SCHEMAFULL;
DEFINE FIELD key ON TABLE system_config TYPE string;
DEFINE FIELD value ON TABLE system_config TYPE string;
DEFINE FIELD value_type ON TABLE system_config TYPE string \
    ASSERT $value IN ['string', 'int', 'bool', 'json'];
DEFINE FIELD category ON TABLE system_config TYPE string;
DEFINE FIELD description ON TABLE system_config TYPE option<string>;
DEFINE FIELD updated_at ON TABLE system_config TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_system_config_key ON TABLE system_config \
    COLUMNS key UNIQUE;

-- =======================================================================
-- Patients (tenant scope)
-- =======================================================================
DEFINE TABLE patient SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE patient TYPE string;
DEFINE FIELD user_id ON TABLE patient TYPE option<string>;
DEFINE FIELD first_name ON TABLE patient TYPE string;
DEFINE FIELD last_name ON TABLE patient TYPE string;
DEFINE FIELD email ON TABLE patient TYPE option<string>;
DEFINE FIELD phone ON TABLE patient TYPE option<string>;
DEFINE FIELD notes ON TABLE patient TYPE option<string>;
DEFINE FIELD created_at ON TABLE patient TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE patient TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_patient_tenant ON TABLE patient COLUMNS tenant_id;
DEFINE INDEX idx_patient_tenant_user ON TABLE patient \
    COLUMNS tenant_id, user_id;

-- =======================================================================
-- Password resets
-- =======================================================================
DEFINE TABLE password_reset SCHEMAFULL;
DEFINE FIELD user_id ON TABLE password_reset TYPE string;
DEFINE FIELD token_hash ON TABLE password_reset TYPE string;
DEFINE FIELD expires_at ON TABLE password_reset TYPE datetime;
DEFINE FIELD used_at ON TABLE password_reset TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE password_reset TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_password_reset_token ON TABLE password_reset \
    COLUMNS token_hash UNIQUE;

-- =======================================================================
-- Audit Log (append-only)
-- Table permissions bind record-level sessions only; root and namespace
-- users, including the server's own connection, bypass them.
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime;
DEFINE FIELD user_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD user_email ON TABLE audit_log TYPE option<string>;
DEFINE FIELD tenant_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD category ON TABLE audit_log TYPE string;
DEFINE FIELD entity_type ON TABLE audit_log TYPE option<string>;
DEFINE FIELD entity_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD ip_address ON TABLE audit_log TYPE option<string>;
DEFINE FIELD user_agent ON TABLE audit_log TYPE option<string>;
DEFINE FIELD details ON TABLE audit_log TYPE object FLEXIBLE DEFAULT {};
DEFINE INDEX idx_audit_timestamp ON TABLE audit_log COLUMNS timestamp;
DEFINE INDEX idx_audit_action ON TABLE audit_log COLUMNS action;
DEFINE INDEX idx_audit_category ON TABLE audit_log COLUMNS category;
DEFINE INDEX idx_audit_user ON TABLE audit_log COLUMNS user_id;
DEFINE INDEX idx_audit_tenant ON TABLE audit_log COLUMNS tenant_id;
";

/// Apply all pending migrations in version order.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current_version = current_version(db).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            match migration.step {
                Step::Sql(sql) => {
                    db.query(sql).await?.check().map_err(|e| {
                        DbError::Migration(format!(
                            "Migration v{} '{}' failed: {}",
                            migration.version, migration.name, e,
                        ))
                    })?;
                }
                Step::RoleRevision(id) => {
                    let revision = role_evolver::revision(id).ok_or_else(|| {
                        DbError::Migration(format!("unknown role revision {id}"))
                    })?;
                    revision.upgrade(db).await?;
                }
            }

            record_migration(db, migration.version, migration.name).await?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Revert the most recent migration if it is the given role revision.
///
/// Only role revisions are reversible; schema steps are forward-only.
pub async fn rollback_role_revision<C: Connection>(
    db: &Surreal<C>,
    revision_id: &str,
) -> Result<(), DbError> {
    let revision = role_evolver::revision(revision_id)
        .ok_or_else(|| DbError::Migration(format!("unknown role revision {revision_id}")))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let latest = records.first().ok_or_else(|| {
        DbError::Migration("no migrations have been applied".into())
    })?;
    if latest.name != revision_id {
        return Err(DbError::Migration(format!(
            "{revision_id} is not the latest applied migration (latest: {})",
            latest.name
        )));
    }

    revision.downgrade(db).await?;

    db.query("DELETE _migration WHERE version = $version")
        .bind(("version", latest.version))
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    info!(revision = revision_id, "Role revision rolled back");
    Ok(())
}

async fn current_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

async fn record_migration<C: Connection>(
    db: &Surreal<C>,
    version: u32,
    name: &'static str,
) -> Result<(), DbError> {
    db.query(
        "CREATE _migration SET version = $version, \
         name = $name",
    )
    .bind(("version", version))
    .bind(("name", name))
    .await?
    .check()
    .map_err(|e| {
        DbError::Migration(format!("Failed to record migration v{version}: {e}"))
    })?;
    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for tests that need the pre-revision role label set.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
