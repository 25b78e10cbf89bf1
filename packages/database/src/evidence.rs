//! Evidence rows linking an uploaded file to an incident.
//!
//! The evidence table layout differs between deployments, so the link,
//! filename, and media-type columns are each chosen from a list of known
//! names. Evidence is written after the incident and never rolls it back:
//! a skipped or failed evidence write is reported, not returned as an error.

use std::collections::BTreeSet;

use cusco_reporta_database_models::{EvidenceFile, IncidentTables};
use switchy_database::DatabaseValue;

use crate::report::{FailureKind, FailureReporter};
use crate::schema::{pick_first, qualified, quote_ident};
use crate::store::{IncidentStore, Statement};

/// Columns that can link an evidence row to its incident, in priority order.
pub const LINK_COLUMNS: &[&str] = &["incidencia_id", "incidencias_id", "id_incidencia"];

/// Columns that can hold the stored filename, in priority order.
pub const FILE_COLUMNS: &[&str] = &[
    "archivo",
    "nombre_archivo",
    "filename",
    "ruta",
    "path",
    "url",
];

/// Columns that can hold the media type, in priority order.
pub const MEDIA_TYPE_COLUMNS: &[&str] = &["tipo", "mime", "mimetype", "content_type"];

/// Media type stored when the upload declared none.
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Evidence columns resolved against an observed column set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceColumns<'a> {
    /// Column holding the incident id.
    pub link: &'a str,
    /// Column holding the stored filename.
    pub file: &'a str,
    /// Column holding the media type, if the table has one.
    pub media_type: Option<&'a str>,
}

/// Why no evidence row can be written to the observed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EvidenceSkip {
    /// None of [`LINK_COLUMNS`] exist.
    #[error("evidence table has no incident link column")]
    MissingLinkColumn,
    /// None of [`FILE_COLUMNS`] exist.
    #[error("evidence table has no filename column")]
    MissingFileColumn,
}

/// Result of trying to link an evidence file to an incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceOutcome {
    /// One evidence row was inserted.
    Inserted,
    /// No compatible columns were found; nothing was written.
    Skipped(EvidenceSkip),
    /// The insert was attempted and failed.
    Failed(String),
}

/// Picks the evidence columns to write.
///
/// # Errors
///
/// Returns [`EvidenceSkip`] when no link column or no filename column
/// exists. A missing media-type column is not an error.
pub fn resolve_evidence_columns(
    observed: &BTreeSet<String>,
) -> Result<EvidenceColumns<'static>, EvidenceSkip> {
    let link = pick_first(observed, LINK_COLUMNS).ok_or(EvidenceSkip::MissingLinkColumn)?;
    let file = pick_first(observed, FILE_COLUMNS).ok_or(EvidenceSkip::MissingFileColumn)?;

    Ok(EvidenceColumns {
        link,
        file,
        media_type: pick_first(observed, MEDIA_TYPE_COLUMNS),
    })
}

/// Builds the evidence `INSERT` for the resolved columns.
#[must_use]
pub fn build_evidence_insert(
    tables: &IncidentTables,
    columns: EvidenceColumns<'_>,
    incident_id: i64,
    file: &EvidenceFile,
) -> Statement {
    let mut names = vec![quote_ident(columns.link), quote_ident(columns.file)];
    let mut placeholders = vec!["$1::bigint".to_string(), "$2".to_string()];
    let mut params = vec![
        DatabaseValue::Int64(incident_id),
        DatabaseValue::String(file.stored_filename.clone()),
    ];

    if let Some(media_type) = columns.media_type {
        names.push(quote_ident(media_type));
        placeholders.push("$3".to_string());
        params.push(DatabaseValue::String(
            file.media_type
                .clone()
                .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string()),
        ));
    }

    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified(tables, &tables.evidence),
            names.join(", "),
            placeholders.join(", "),
        ),
        params,
    }
}

/// Links `file` to the already-persisted incident `incident_id`.
///
/// Never fails: skips and store errors are reported through `reporter` and
/// returned as an [`EvidenceOutcome`]. The caller must not retry the whole
/// submission on a non-inserted outcome since that would duplicate the
/// incident.
pub async fn link_evidence<S: IncidentStore + ?Sized>(
    store: &S,
    tables: &IncidentTables,
    incident_id: i64,
    file: &EvidenceFile,
    observed: &BTreeSet<String>,
    reporter: &dyn FailureReporter,
) -> EvidenceOutcome {
    let columns = match resolve_evidence_columns(observed) {
        Ok(columns) => columns,
        Err(skip) => {
            reporter.report(
                FailureKind::EvidenceSkipped,
                &format!(
                    "Incident {incident_id} saved without evidence {}: {skip}",
                    file.stored_filename
                ),
            );
            return EvidenceOutcome::Skipped(skip);
        }
    };

    let statement = build_evidence_insert(tables, columns, incident_id, file);

    match store.execute(&statement).await {
        Ok(_) => {
            log::debug!(
                "Linked evidence {} to incident {incident_id} via {}",
                file.stored_filename,
                columns.link
            );
            EvidenceOutcome::Inserted
        }
        Err(e) => {
            reporter.report(
                FailureKind::EvidenceFailed,
                &format!(
                    "Incident {incident_id} saved but evidence {} failed: {e}",
                    file.stored_filename
                ),
            );
            EvidenceOutcome::Failed(e.to_string())
        }
    }
}
