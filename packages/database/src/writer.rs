//! Schema-adaptive incident insertion.
//!
//! An incident is described by an ordered list of attributes, each mapped
//! to candidate column names. At write time the list is filtered against
//! the columns observed on the incident table and the `INSERT` is built from
//! what remains. Attributes whose column does not exist are never sent.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use cusco_reporta_database_models::{EvidenceFile, IncidentSubmission, IncidentTables};
use cusco_reporta_incident_models::normalize::{
    clean_text, parse_id_or_null, parse_number_or_null, plate_or_none, resolve_record_kind,
};
use cusco_reporta_incident_models::{
    DEFAULT_DEPARTMENT, DEFAULT_PROVINCE, INITIAL_STATUS_ID, RecordKind,
};
use switchy_database::DatabaseValue;

use crate::IncidentError;
use crate::evidence::{EvidenceOutcome, link_evidence};
use crate::geometry::{GeoPoint, MissingPointPolicy, point_expression};
use crate::report::{FailureKind, FailureReporter};
use crate::schema::{observe_columns, pick_first, qualified, quote_ident};
use crate::store::{IncidentStore, Statement};

/// Submission fields a writer profile can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionField {
    /// `fecha_incidente`
    IncidentDate,
    /// `categoria_id`
    Category,
    /// `titulo`
    Title,
    /// `descripcion`
    Description,
}

impl SubmissionField {
    /// Returns the submission field name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IncidentDate => "fecha_incidente",
            Self::Category => "categoria_id",
            Self::Title => "titulo",
            Self::Description => "descripcion",
        }
    }

    fn value(self, submission: &IncidentSubmission) -> Option<&str> {
        match self {
            Self::IncidentDate => submission.fecha_incidente.as_deref(),
            Self::Category => submission.categoria_id.as_deref(),
            Self::Title => submission.titulo.as_deref(),
            Self::Description => submission.descripcion.as_deref(),
        }
    }

    /// Returns all variants, in the order missing fields are reported.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::IncidentDate,
            Self::Category,
            Self::Title,
            Self::Description,
        ]
    }
}

/// Fields every writer profile requires.
pub const MINIMUM_REQUIRED: &[SubmissionField] = &[
    SubmissionField::IncidentDate,
    SubmissionField::Title,
    SubmissionField::Description,
];

/// Validation and defaulting rules for one write entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterConfig {
    /// Fields that must be present and non-blank, in addition to
    /// [`MINIMUM_REQUIRED`].
    pub required_fields: Vec<SubmissionField>,
    /// Whether the category must be present and numeric. When `false` a
    /// missing or non-numeric category is stored as null.
    pub category_required: bool,
    /// What to store in the geometry column without usable coordinates.
    pub missing_point: MissingPointPolicy,
    /// Department stored when none was submitted.
    pub default_department: String,
    /// Province stored when none was submitted.
    pub default_province: String,
    /// Status id assigned to the new incident.
    pub initial_status_id: i64,
}

impl WriterConfig {
    /// Profile used by the citizen panel: category required, location
    /// never null.
    #[must_use]
    pub fn citizen() -> Self {
        Self {
            required_fields: vec![SubmissionField::Category],
            category_required: true,
            missing_point: MissingPointPolicy::DefaultPoint,
            default_department: DEFAULT_DEPARTMENT.to_string(),
            default_province: DEFAULT_PROVINCE.to_string(),
            initial_status_id: INITIAL_STATUS_ID,
        }
    }

    /// Minimal profile: category optional, location null without
    /// coordinates.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            required_fields: Vec::new(),
            category_required: false,
            missing_point: MissingPointPolicy::Null,
            ..Self::citizen()
        }
    }

    fn requires(&self, field: SubmissionField) -> bool {
        MINIMUM_REQUIRED.contains(&field)
            || self.required_fields.contains(&field)
            || (field == SubmissionField::Category && self.category_required)
    }
}

/// Named writer profiles selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteProfile {
    /// [`WriterConfig::citizen`]
    #[default]
    Citizen,
    /// [`WriterConfig::minimal`]
    Minimal,
}

impl WriteProfile {
    /// Returns the writer configuration for this profile.
    #[must_use]
    pub fn config(self) -> WriterConfig {
        match self {
            Self::Citizen => WriterConfig::citizen(),
            Self::Minimal => WriterConfig::minimal(),
        }
    }
}

impl std::str::FromStr for WriteProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "citizen" => Ok(Self::Citizen),
            "minimal" => Ok(Self::Minimal),
            other => Err(format!("unknown write profile: {other}")),
        }
    }
}

/// A validated, normalized incident ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedIncident {
    /// Resolved record kind.
    pub kind: RecordKind,
    /// Initial status id.
    pub status_id: i64,
    /// When the incident happened.
    pub incident_date: NaiveDateTime,
    /// Category id, if any.
    pub category_id: Option<i64>,
    /// Canonical plate, `None` when empty after normalization.
    pub plate: Option<String>,
    /// Trimmed title.
    pub title: String,
    /// Trimmed description.
    pub description: String,
    /// Department, defaulted.
    pub department: String,
    /// Province, defaulted.
    pub province: String,
    /// District.
    pub district: Option<String>,
    /// Place reference.
    pub place_reference: Option<String>,
    /// Point to store, `None` for an explicit null.
    pub point: Option<GeoPoint>,
    /// Submitting user id.
    pub user_id: Option<i64>,
}

/// Parses an incident date or date-time as submitted by a form.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM[:SS]`,
/// and RFC 3339 (kept as wall-clock time). Dates alone mean midnight.
#[must_use]
pub fn parse_incident_date(value: &str) -> Option<NaiveDateTime> {
    const DATE_TIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    let value = value.trim();

    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Validates and normalizes a submission.
///
/// Runs before any store interaction, so a rejected submission never
/// causes a write.
///
/// # Errors
///
/// * [`IncidentError::MissingFields`] if a required field is missing or
///   blank
/// * [`IncidentError::InvalidField`] if the incident date cannot be parsed
///   or a required category is not an integer
pub fn prepare_incident(
    submission: &IncidentSubmission,
    config: &WriterConfig,
) -> Result<PreparedIncident, IncidentError> {
    let missing: Vec<&'static str> = SubmissionField::all()
        .iter()
        .filter(|field| config.requires(**field))
        .filter(|field| clean_text(field.value(submission)).is_none())
        .map(|field| field.name())
        .collect();

    if !missing.is_empty() {
        return Err(IncidentError::MissingFields { fields: missing });
    }

    let raw_date = submission.fecha_incidente.as_deref().unwrap_or_default();
    let incident_date =
        parse_incident_date(raw_date).ok_or_else(|| IncidentError::InvalidField {
            field: SubmissionField::IncidentDate.name(),
            message: format!("expected a date such as 2024-05-01, got {:?}", raw_date.trim()),
        })?;

    let category_id = parse_id_or_null(submission.categoria_id.as_deref());
    if config.category_required && category_id.is_none() {
        return Err(IncidentError::InvalidField {
            field: SubmissionField::Category.name(),
            message: "must be an integer id".to_string(),
        });
    }

    Ok(PreparedIncident {
        kind: resolve_record_kind(
            submission.tipo_registro.as_deref(),
            submission.modo.as_deref(),
        ),
        status_id: config.initial_status_id,
        incident_date,
        category_id,
        plate: plate_or_none(submission.placa.as_deref()),
        title: clean_text(submission.titulo.as_deref()).unwrap_or_default(),
        description: clean_text(submission.descripcion.as_deref()).unwrap_or_default(),
        department: clean_text(submission.departamento.as_deref())
            .unwrap_or_else(|| config.default_department.clone()),
        province: clean_text(submission.provincia.as_deref())
            .unwrap_or_else(|| config.default_province.clone()),
        district: clean_text(submission.distrito.as_deref()),
        place_reference: clean_text(submission.referencia_lugar.as_deref()),
        point: config.missing_point.resolve(
            parse_number_or_null(submission.lng.as_deref()),
            parse_number_or_null(submission.lat.as_deref()),
        ),
        user_id: parse_id_or_null(submission.usuario_id.as_deref()),
    })
}

/// Conceptual incident attributes, in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentAttribute {
    /// Record kind.
    RecordKind,
    /// Initial status reference.
    Status,
    /// Incident date-time.
    IncidentDate,
    /// Category reference.
    Category,
    /// Vehicle plate.
    Plate,
    /// Title.
    Title,
    /// Description.
    Description,
    /// Department.
    Department,
    /// Province.
    Province,
    /// District.
    District,
    /// Place reference.
    PlaceReference,
    /// Geometry point.
    Location,
    /// Submitting user.
    User,
}

/// How one attribute is written.
#[derive(Debug, Clone)]
enum ColumnValue {
    /// A single bound parameter, optionally cast in SQL.
    Bound(DatabaseValue, Option<&'static str>),
    /// A point built from two bound parameters.
    Point(GeoPoint),
    /// A literal `NULL`.
    Null,
}

fn text(value: &str) -> ColumnValue {
    ColumnValue::Bound(DatabaseValue::String(value.to_string()), None)
}

fn optional_text(value: Option<&String>) -> ColumnValue {
    value.map_or(ColumnValue::Bound(DatabaseValue::Null, None), |v| text(v))
}

fn optional_id(value: Option<i64>) -> ColumnValue {
    ColumnValue::Bound(
        value.map_or(DatabaseValue::Null, DatabaseValue::Int64),
        Some("bigint"),
    )
}

impl IncidentAttribute {
    /// All attributes, in insertion order.
    pub const ORDERED: &'static [Self] = &[
        Self::RecordKind,
        Self::Status,
        Self::IncidentDate,
        Self::Category,
        Self::Plate,
        Self::Title,
        Self::Description,
        Self::Department,
        Self::Province,
        Self::District,
        Self::PlaceReference,
        Self::Location,
        Self::User,
    ];

    /// Column names that can hold this attribute, in priority order.
    #[must_use]
    pub const fn column_candidates(self) -> &'static [&'static str] {
        match self {
            Self::RecordKind => &["tipo_registro"],
            Self::Status => &["estado_id"],
            Self::IncidentDate => &["fecha_incidente"],
            Self::Category => &["categoria_id"],
            Self::Plate => &["placa"],
            Self::Title => &["titulo"],
            Self::Description => &["descripcion"],
            Self::Department => &["departamento"],
            Self::Province => &["provincia"],
            Self::District => &["distrito"],
            Self::PlaceReference => &["referencia_lugar"],
            Self::Location => &["ubicacion"],
            Self::User => &["usuario_id"],
        }
    }

    fn value(self, incident: &PreparedIncident) -> ColumnValue {
        match self {
            Self::RecordKind => text(incident.kind.as_ref()),
            Self::Status => optional_id(Some(incident.status_id)),
            Self::IncidentDate => ColumnValue::Bound(
                DatabaseValue::DateTime(incident.incident_date),
                Some("timestamp"),
            ),
            Self::Category => optional_id(incident.category_id),
            Self::Plate => optional_text(incident.plate.as_ref()),
            Self::Title => text(&incident.title),
            Self::Description => text(&incident.description),
            Self::Department => text(&incident.department),
            Self::Province => text(&incident.province),
            Self::District => optional_text(incident.district.as_ref()),
            Self::PlaceReference => optional_text(incident.place_reference.as_ref()),
            Self::Location => incident.point.map_or(ColumnValue::Null, ColumnValue::Point),
            Self::User => optional_id(incident.user_id),
        }
    }
}

/// Builds the incident `INSERT ... RETURNING id` restricted to the
/// observed columns.
///
/// # Errors
///
/// * [`IncidentError::MissingIdColumn`] if the table has no `id` column
/// * [`IncidentError::NoWritableColumns`] if none of the attribute columns
///   exist
pub fn build_incident_insert(
    tables: &IncidentTables,
    incident: &PreparedIncident,
    observed: &BTreeSet<String>,
) -> Result<Statement, IncidentError> {
    if !observed.contains("id") {
        return Err(IncidentError::MissingIdColumn {
            table: tables.incidents.clone(),
        });
    }

    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut params = Vec::new();

    for attribute in IncidentAttribute::ORDERED {
        let Some(column) = pick_first(observed, attribute.column_candidates()) else {
            continue;
        };
        columns.push(quote_ident(column));

        match attribute.value(incident) {
            ColumnValue::Bound(value, cast) => {
                params.push(value);
                let idx = params.len();
                placeholders.push(cast.map_or_else(|| format!("${idx}"), |c| format!("${idx}::{c}")));
            }
            ColumnValue::Point(point) => {
                params.push(DatabaseValue::Real64(point.longitude));
                params.push(DatabaseValue::Real64(point.latitude));
                let lat_idx = params.len();
                placeholders.push(point_expression(lat_idx - 1, lat_idx));
            }
            ColumnValue::Null => placeholders.push("NULL".to_string()),
        }
    }

    if columns.is_empty() {
        return Err(IncidentError::NoWritableColumns {
            table: tables.incidents.clone(),
        });
    }

    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING id::bigint AS id",
            qualified(tables, &tables.incidents),
            columns.join(", "),
            placeholders.join(", "),
        ),
        params,
    })
}

/// Inserts a prepared incident and returns its new id.
///
/// # Errors
///
/// * [`IncidentError::MissingIdColumn`] if the table has no `id` column
/// * [`IncidentError::NoWritableColumns`] if no attribute column exists
/// * [`IncidentError::Store`] if the insert fails
pub async fn insert_incident<S: IncidentStore + ?Sized>(
    store: &S,
    tables: &IncidentTables,
    incident: &PreparedIncident,
    observed: &BTreeSet<String>,
) -> Result<i64, IncidentError> {
    let statement = build_incident_insert(tables, incident, observed)?;
    let id = store.insert_returning_id(&statement).await?;
    log::debug!("Inserted incident {id} ({} params)", statement.params.len());
    Ok(id)
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedIncident {
    /// Id of the new incident row.
    pub id: i64,
    /// Canonical plate that was stored, if any.
    pub plate: Option<String>,
    /// What happened to the attached evidence file, if one was attached.
    pub evidence: Option<EvidenceOutcome>,
}

/// Runs the full write path for one submission.
///
/// Validates, observes both tables, inserts the incident, and links the
/// evidence file when one is attached. An `Ok` result means the incident
/// row was committed; evidence problems never turn it into an error.
///
/// # Errors
///
/// * [`IncidentError::MissingFields`] / [`IncidentError::InvalidField`] for
///   rejected input (nothing written)
/// * [`IncidentError::MissingIdColumn`], [`IncidentError::NoWritableColumns`]
///   or [`IncidentError::Store`] if the incident could not be written
pub async fn submit_incident<S: IncidentStore + ?Sized>(
    store: &S,
    tables: &IncidentTables,
    config: &WriterConfig,
    submission: &IncidentSubmission,
    evidence: Option<&EvidenceFile>,
    reporter: &dyn FailureReporter,
) -> Result<SubmittedIncident, IncidentError> {
    let incident = prepare_incident(submission, config).inspect_err(|e| {
        reporter.report(FailureKind::Validation, &format!("Rejected incident: {e}"));
    })?;

    let written = async {
        let observed = observe_columns(store, tables).await?;
        let id = insert_incident(store, tables, &incident, &observed.incidents).await?;
        Ok::<_, IncidentError>((id, observed))
    }
    .await;

    let (id, observed) = written.inspect_err(|e| {
        reporter.report(FailureKind::Store, &format!("Failed to register incident: {e}"));
    })?;

    log::info!("Registered incident {id} ({})", incident.kind);

    let evidence = match evidence {
        Some(file) => {
            Some(link_evidence(store, tables, id, file, &observed.evidence, reporter).await)
        }
        None => None,
    };

    Ok(SubmittedIncident {
        id,
        plate: incident.plate,
        evidence,
    })
}
