//! SurrealDB implementation of [`PatientRepository`].
//!
//! Reads go through [`ScopedQuery`]; a row outside the caller's scope is
//! reported exactly like a missing one.

use chrono::{DateTime, Utc};
use clinic_core::error::ClinicResult;
use clinic_core::models::patient::{CreatePatient, Patient};
use clinic_core::repository::{PaginatedResult, Pagination, PatientRepository};
use clinic_core::scope::DataScope;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::first;
use crate::error::{DbError, parse_opt_uuid, parse_uuid};
use crate::scoped::{PATIENTS, ScopedQuery};

#[derive(Debug, SurrealValue)]
struct PatientRow {
    record_id: String,
    tenant_id: String,
    user_id: Option<String>,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PatientRow {
    fn try_into_patient(self) -> Result<Patient, DbError> {
        Ok(Patient {
            id: parse_uuid("patient", &self.record_id)?,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            user_id: parse_opt_uuid("user", self.user_id.as_deref())?,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Patient repository.
#[derive(Clone)]
pub struct SurrealPatientRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPatientRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PatientRepository for SurrealPatientRepository<C> {
    async fn create(&self, tenant_id: Uuid, input: CreatePatient) -> ClinicResult<Patient> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('patient', $id) SET \
                 tenant_id = $tenant_id, user_id = $user_id, \
                 first_name = $first_name, last_name = $last_name, \
                 email = $email, phone = $phone, notes = $notes",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("user_id", input.user_id.map(|u| u.to_string())))
            .bind(("first_name", input.first_name))
            .bind(("last_name", input.last_name))
            .bind(("email", input.email))
            .bind(("phone", input.phone))
            .bind(("notes", input.notes))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_check("patient", e))?;

        self.get_by_id(&DataScope::Tenant { tenant_id }, id).await
    }

    async fn get_by_id(&self, scope: &DataScope, id: Uuid) -> ClinicResult<Patient> {
        let rows: Vec<PatientRow> = ScopedQuery::select(PATIENTS)
            .filter(
                "id = type::record('patient', $patient_id)",
                "patient_id",
                id.to_string(),
            )
            .scoped(scope)
            .fetch(&self.db)
            .await?;
        Ok(first(rows, "patient", id)?.try_into_patient()?)
    }

    async fn list(
        &self,
        scope: &DataScope,
        pagination: Pagination,
    ) -> ClinicResult<PaginatedResult<Patient>> {
        let total = ScopedQuery::count(PATIENTS)
            .scoped(scope)
            .fetch_count(&self.db)
            .await?;

        let rows: Vec<PatientRow> = ScopedQuery::select(PATIENTS)
            .scoped(scope)
            .order_by("last_name ASC, first_name ASC")
            .paginate(&pagination)
            .fetch(&self.db)
            .await?;

        let items = rows
            .into_iter()
            .map(PatientRow::try_into_patient)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
