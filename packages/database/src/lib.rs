#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Incident write and read paths for Cusco Reporta.
//!
//! The incident and evidence tables are not described by static models.
//! Their columns are discovered from `information_schema` on every request
//! and statements are built from whatever columns currently exist. `PostGIS`
//! queries use raw SQL via `query_raw_params()` with every user-supplied
//! value bound as a parameter.

pub mod db;
pub mod evidence;
pub mod geometry;
pub mod queries;
pub mod report;
pub mod schema;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod writer;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Errors returned by the incident write and read operations.
#[derive(Debug, thiserror::Error)]
pub enum IncidentError {
    /// Required input was missing or blank. Nothing was written.
    #[error("Missing required fields: {}", fields.join(", "))]
    MissingFields {
        /// Names of the missing fields, in submission order.
        fields: Vec<&'static str>,
    },

    /// Input was present but malformed. Nothing was written.
    #[error("Invalid value for {field}: {message}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// None of the known incident columns exist on the incident table.
    #[error("Cannot build INSERT: no known incident columns exist on {table}")]
    NoWritableColumns {
        /// The table that was introspected.
        table: String,
    },

    /// The incident table has no `id` column to return the new key from.
    #[error("Cannot build INSERT: {table} has no id column")]
    MissingIdColumn {
        /// The table that was introspected.
        table: String,
    },

    /// The store rejected or failed a statement.
    #[error(transparent)]
    Store(#[from] DbError),
}

impl IncidentError {
    /// Whether this error was caused by the caller's input rather than the
    /// store.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::MissingFields { .. } | Self::InvalidField { .. })
    }
}
