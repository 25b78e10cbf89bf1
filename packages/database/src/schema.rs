//! Runtime column discovery for the incident and evidence tables.
//!
//! Columns are looked up fresh on every request. Nothing is cached, so a
//! schema change between deployments is picked up without a restart.

use std::collections::BTreeSet;

use cusco_reporta_database_models::IncidentTables;

use crate::DbError;
use crate::store::IncidentStore;

/// Column sets observed on the incident and evidence tables for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedColumns {
    /// Columns of the incident table.
    pub incidents: BTreeSet<String>,
    /// Columns of the evidence table.
    pub evidence: BTreeSet<String>,
}

/// Looks up the current columns of the incident and evidence tables
/// concurrently.
///
/// # Errors
///
/// Returns [`DbError`] if either catalog query fails.
pub async fn observe_columns<S: IncidentStore + ?Sized>(
    store: &S,
    tables: &IncidentTables,
) -> Result<ObservedColumns, DbError> {
    let (incidents, evidence) = tokio::try_join!(
        store.table_columns(&tables.schema, &tables.incidents),
        store.table_columns(&tables.schema, &tables.evidence),
    )?;

    if incidents.is_empty() {
        log::warn!(
            "Table {}.{} has no visible columns",
            tables.schema,
            tables.incidents
        );
    }

    Ok(ObservedColumns {
        incidents,
        evidence,
    })
}

/// Returns the first candidate that is present in `observed`.
#[must_use]
pub fn pick_first<'a>(observed: &BTreeSet<String>, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|candidate| observed.contains(*candidate))
}

/// Double-quotes a SQL identifier, escaping embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns the schema-qualified, quoted name of `table`.
#[must_use]
pub fn qualified(tables: &IncidentTables, table: &str) -> String {
    format!("{}.{}", quote_ident(&tables.schema), quote_ident(table))
}
