//! Patient directory lookups used to validate enqueue input
//!
//! The queue never caches or copies patient data; it only asks whether a
//! reference exists.

use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;

#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// Whether `patient_ref` names a known patient
    async fn resolve(&self, patient_ref: &str) -> Result<bool>;
}

/// Existence check against a patient table in the queue database
#[derive(Clone)]
pub struct PostgresPatientDirectory {
    pool: PgPool,
    query: String,
}

impl PostgresPatientDirectory {
    /// `table` and `id_column` come from configuration and are validated as
    /// plain SQL identifiers before being spliced into the query.
    pub fn new(pool: PgPool, table: &str, id_column: &str) -> Result<Self> {
        for ident in [table, id_column] {
            if !is_identifier(ident) {
                return Err(Error::Validation(format!(
                    "invalid patient directory identifier: {}",
                    ident
                )));
            }
        }

        Ok(Self {
            pool,
            query: format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
                table, id_column
            ),
        })
    }
}

/// Accepts `name` or `schema.name` made of ASCII letters, digits and underscores
fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').count() <= 2
        && value.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[async_trait]
impl PatientDirectory for PostgresPatientDirectory {
    async fn resolve(&self, patient_ref: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(&self.query)
            .bind(patient_ref)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

/// Resolves every reference; used when directory checks are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDirectory;

#[async_trait]
impl PatientDirectory for OpenDirectory {
    async fn resolve(&self, _patient_ref: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Fixed set of known patients
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    known: HashSet<String>,
}

impl StaticDirectory {
    pub fn new<I, S>(patients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: patients.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PatientDirectory for StaticDirectory {
    async fn resolve(&self, patient_ref: &str) -> Result<bool> {
        Ok(self.known.contains(patient_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_identifier("patients"));
        assert!(is_identifier("registry.patients"));
        assert!(is_identifier("_id"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1patients"));
        assert!(!is_identifier("patients; DROP TABLE x"));
        assert!(!is_identifier("a.b.c"));
    }

    #[tokio::test]
    async fn test_static_directory() {
        let directory = StaticDirectory::new(["p-1", "p-2"]);
        assert!(directory.resolve("p-1").await.unwrap());
        assert!(!directory.resolve("p-9").await.unwrap());
        assert!(OpenDirectory.resolve("anyone").await.unwrap());
    }
}
