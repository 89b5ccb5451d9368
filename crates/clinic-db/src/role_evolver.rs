//! Role-schema evolver: online rename/add of enumerated role labels.
//!
//! The `userrole` type is a closed label set asserted on `user.role` and
//! `membership.role`. Neither rename nor add is an in-place operation,
//! so every change is a rebuild executed as one transaction:
//!
//! 1. stage the target label set as `userrole_new`;
//! 2. widen both columns to plain `string`;
//! 3. lowercase legacy values, then apply the renames;
//! 4. abort if any row is still outside the target set;
//! 5. re-assert both columns against the target set and swap
//!    `userrole_new` into `userrole`.
//!
//! A failed rebuild leaves the schema and every row untouched.

use std::sync::LazyLock;

use regex::Regex;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex"));

/// Name of the enumerated type holding per-principal roles.
pub const ROLE_TYPE: &str = "userrole";

/// Columns typed by `userrole`. Memberships may never hold `superadmin`.
const ROLE_COLUMNS: &[(&str, Option<&str>)] = &[("user", None), ("membership", Some("superadmin"))];

/// A reversible change to the role label set.
#[derive(Debug)]
pub struct RoleRevision {
    pub id: &'static str,
    pub description: &'static str,
    pub labels_before: &'static [&'static str],
    pub labels_after: &'static [&'static str],
    /// `(old, new)` pairs applied on upgrade; inverted on downgrade.
    pub renames: &'static [(&'static str, &'static str)],
}

pub static ROLE_REVISIONS: &[RoleRevision] = &[RoleRevision {
    id: "a1b2c3d4e5f6",
    description: "rename role client to closer",
    labels_before: &[
        "superadmin",
        "tenant_admin",
        "manager",
        "medico",
        "client",
        "recepcionista",
        "patient",
    ],
    labels_after: &[
        "superadmin",
        "tenant_admin",
        "manager",
        "medico",
        "closer",
        "recepcionista",
        "patient",
    ],
    renames: &[("client", "closer")],
}];

/// Look up a registered revision by id.
pub fn revision(id: &str) -> Option<&'static RoleRevision> {
    ROLE_REVISIONS.iter().find(|r| r.id == id)
}

impl RoleRevision {
    pub async fn upgrade<C: Connection>(&self, db: &Surreal<C>) -> Result<(), DbError> {
        info!(revision = self.id, description = self.description, "Upgrading role schema");
        let renames: Vec<(&str, &str)> = self.renames.to_vec();
        rebuild(db, self.labels_after, &renames).await
    }

    /// Inverse of [`upgrade`](Self::upgrade): renames are reversed and the
    /// previous label set is restored.
    pub async fn downgrade<C: Connection>(&self, db: &Surreal<C>) -> Result<(), DbError> {
        info!(revision = self.id, "Downgrading role schema");
        let renames: Vec<(&str, &str)> = self.renames.iter().map(|(a, b)| (*b, *a)).collect();
        rebuild(db, self.labels_before, &renames).await
    }
}

#[derive(Debug, SurrealValue)]
struct EnumTypeRow {
    labels: Vec<String>,
}

/// Current label set of the role type.
pub async fn current_labels<C: Connection>(db: &Surreal<C>) -> Result<Vec<String>, DbError> {
    let mut result = db
        .query("SELECT labels FROM type::record('enum_type', $name)")
        .bind(("name", ROLE_TYPE))
        .await?;
    let rows: Vec<EnumTypeRow> = result.take(0)?;
    rows.into_iter()
        .next()
        .map(|r| r.labels)
        .ok_or_else(|| DbError::not_found("enum_type", ROLE_TYPE))
}

/// Append a label to the role type.
///
/// SurrealDB has no `ADD VALUE IF NOT EXISTS`, so this runs the rebuild
/// with no renames. Adding an existing label is a no-op. There is no
/// inverse: removing a label requires a full rebuild with an explicit
/// revision.
pub async fn add_role_label<C: Connection>(db: &Surreal<C>, label: &str) -> Result<(), DbError> {
    let mut labels = current_labels(db).await?;
    if labels.iter().any(|l| l == label) {
        return Ok(());
    }
    labels.push(label.to_string());
    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
    info!(label, "Adding role label");
    rebuild(db, &labels, &[]).await
}

/// Render the single-transaction rebuild script.
///
/// Labels are inlined into the field definitions (schema definitions
/// cannot reference query parameters), so every label is checked
/// against a strict identifier pattern first.
pub fn rebuild_script(labels: &[&str], renames: &[(&str, &str)]) -> Result<String, DbError> {
    for label in labels
        .iter()
        .chain(renames.iter().flat_map(|(a, b)| [a, b]))
    {
        if !LABEL_RE.is_match(label) {
            return Err(DbError::Migration(format!("invalid role label: {label:?}")));
        }
    }
    if labels.is_empty() {
        return Err(DbError::Migration("role label set must not be empty".into()));
    }

    let literal = labels
        .iter()
        .map(|l| format!("'{l}'"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut script = String::from("BEGIN TRANSACTION;\n");
    script.push_str(&format!(
        "DELETE enum_type:{ROLE_TYPE}_new;\n\
         CREATE enum_type:{ROLE_TYPE}_new SET name = '{ROLE_TYPE}_new', labels = [{literal}];\n"
    ));

    for (table, _) in ROLE_COLUMNS {
        script.push_str(&format!(
            "DEFINE FIELD OVERWRITE role ON TABLE {table} TYPE string;\n"
        ));
    }

    for (table, _) in ROLE_COLUMNS {
        script.push_str(&format!(
            "UPDATE {table} SET role = string::lowercase(role) \
             WHERE role != string::lowercase(role);\n"
        ));
        for (from, to) in renames {
            script.push_str(&format!(
                "UPDATE {table} SET role = '{to}' WHERE role = '{from}';\n"
            ));
        }
    }

    for (table, _) in ROLE_COLUMNS {
        script.push_str(&format!(
            "IF count(SELECT id FROM {table} WHERE role NOTINSIDE [{literal}]) > 0 {{ \
             THROW 'role migration aborted: {table} rows outside target label set'; }};\n"
        ));
    }

    for (table, excluded) in ROLE_COLUMNS {
        let mut assertion = format!("$value IN [{literal}]");
        if let Some(excluded) = excluded {
            assertion.push_str(&format!(" AND $value != '{excluded}'"));
        }
        script.push_str(&format!(
            "DEFINE FIELD OVERWRITE role ON TABLE {table} TYPE string ASSERT {assertion};\n"
        ));
    }

    script.push_str(&format!(
        "DELETE enum_type:{ROLE_TYPE};\n\
         CREATE enum_type:{ROLE_TYPE} SET name = '{ROLE_TYPE}', labels = [{literal}];\n\
         DELETE enum_type:{ROLE_TYPE}_new;\n\
         COMMIT TRANSACTION;\n"
    ));

    Ok(script)
}

async fn rebuild<C: Connection>(
    db: &Surreal<C>,
    labels: &[&str],
    renames: &[(&str, &str)],
) -> Result<(), DbError> {
    let script = rebuild_script(labels, renames)?;
    let mut response = db.query(script).await?;
    match DbError::from_statement_errors(ROLE_TYPE, response.take_errors()) {
        Some(err) => Err(DbError::Migration(format!("role schema rebuild failed: {err}"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_lookup() {
        let rev = revision("a1b2c3d4e5f6").unwrap();
        assert_eq!(rev.renames, &[("client", "closer")]);
        assert!(rev.labels_after.contains(&"closer"));
        assert!(!rev.labels_after.contains(&"client"));
        assert!(revision("ffffffffffff").is_none());
    }

    #[test]
    fn every_rename_target_is_in_the_target_set() {
        for rev in ROLE_REVISIONS {
            for (from, to) in rev.renames {
                assert!(rev.labels_after.contains(to), "{}: {to} missing", rev.id);
                assert!(rev.labels_before.contains(from), "{}: {from} missing", rev.id);
            }
        }
    }

    #[test]
    fn script_is_one_transaction_with_orphan_guard() {
        let script = rebuild_script(&["superadmin", "closer"], &[("client", "closer")]).unwrap();
        assert!(script.starts_with("BEGIN TRANSACTION;"));
        assert!(script.trim_end().ends_with("COMMIT TRANSACTION;"));
        assert!(script.contains("UPDATE user SET role = 'closer' WHERE role = 'client';"));
        assert!(script.contains("UPDATE membership SET role = 'closer' WHERE role = 'client';"));
        assert!(script.contains("THROW 'role migration aborted: user rows"));
        assert!(script.contains("AND $value != 'superadmin'"));

        // Widening precedes the rewrites, which precede the re-assertion.
        let widen = script.find("TABLE user TYPE string;").unwrap();
        let rename = script.find("WHERE role = 'client'").unwrap();
        let assert_pos = script.find("TABLE user TYPE string ASSERT").unwrap();
        assert!(widen < rename && rename < assert_pos);
    }

    #[test]
    fn hostile_labels_are_rejected() {
        assert!(rebuild_script(&["ok", "bad'; DELETE user; --"], &[]).is_err());
        assert!(rebuild_script(&["ok"], &[("Client", "ok")]).is_err());
        assert!(rebuild_script(&[], &[]).is_err());
    }
}
