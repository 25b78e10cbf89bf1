#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the Cusco Reporta server.
//!
//! Every response carries an `ok` flag. Field names follow the form and
//! column names the panel frontend already uses (`placa`, `incidencias`,
//! ...), so they are not renamed.

use chrono::NaiveDateTime;
use cusco_reporta_database_models::{PanelIncidentRow, PlateLookup};
use serde::{Deserialize, Serialize};

/// Error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `false`.
    pub ok: bool,
    /// Human-readable reason.
    pub message: String,
}

impl ApiError {
    /// Creates an error body.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Body returned after an incident was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCreated {
    /// Always `true`.
    pub ok: bool,
    /// Human-readable confirmation.
    pub message: String,
    /// Id of the new incident.
    pub id: i64,
    /// Normalized plate that was stored, `null` when none.
    pub placa: Option<String>,
}

/// An incident as returned by the listing and plate endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiIncident {
    /// Incident id.
    pub id: i64,
    /// Record kind (`REPORT` or `DENUNCIATION`).
    pub tipo_registro: Option<String>,
    /// Vehicle plate.
    pub placa: Option<String>,
    /// Category label.
    pub categoria: Option<String>,
    /// Status code.
    pub estado_codigo: Option<String>,
    /// Status label.
    pub estado_nombre: Option<String>,
    /// Title.
    pub titulo: Option<String>,
    /// Description.
    pub descripcion: Option<String>,
    /// When the incident happened.
    pub fecha_incidente: Option<NaiveDateTime>,
    /// Department.
    pub departamento: Option<String>,
    /// Province.
    pub provincia: Option<String>,
    /// District.
    pub distrito: Option<String>,
    /// Place reference.
    pub referencia_lugar: Option<String>,
    /// Longitude.
    pub longitud: Option<f64>,
    /// Latitude.
    pub latitud: Option<f64>,
    /// Location as well-known text.
    pub ubicacion_wkt: Option<String>,
}

impl From<PanelIncidentRow> for ApiIncident {
    fn from(row: PanelIncidentRow) -> Self {
        Self {
            id: row.id,
            tipo_registro: row.tipo_registro,
            placa: row.placa,
            categoria: row.categoria,
            estado_codigo: row.estado_codigo,
            estado_nombre: row.estado_nombre,
            titulo: row.titulo,
            descripcion: row.descripcion,
            fecha_incidente: row.fecha_incidente,
            departamento: row.departamento,
            provincia: row.provincia,
            distrito: row.distrito,
            referencia_lugar: row.referencia_lugar,
            longitud: row.longitud,
            latitud: row.latitud,
            ubicacion_wkt: row.ubicacion_wkt,
        }
    }
}

/// Body returned by the incident listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiIncidentList {
    /// Always `true`.
    pub ok: bool,
    /// Matching incidents, newest first.
    pub incidencias: Vec<ApiIncident>,
    /// Number of incidents returned.
    pub total: usize,
}

impl From<Vec<PanelIncidentRow>> for ApiIncidentList {
    fn from(rows: Vec<PanelIncidentRow>) -> Self {
        let incidencias: Vec<ApiIncident> = rows.into_iter().map(ApiIncident::from).collect();
        Self {
            ok: true,
            total: incidencias.len(),
            incidencias,
        }
    }
}

/// Body returned by a plate lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPlateLookup {
    /// Always `true`.
    pub ok: bool,
    /// Normalized plate that was searched.
    pub placa: String,
    /// Whether any incident was reported for the plate.
    pub reportado: bool,
    /// Number of incidents returned.
    pub total: usize,
    /// Matching incidents, newest first.
    pub incidencias: Vec<ApiIncident>,
}

impl From<PlateLookup> for ApiPlateLookup {
    fn from(lookup: PlateLookup) -> Self {
        Self {
            ok: true,
            reportado: lookup.reported(),
            total: lookup.total(),
            placa: lookup.plate,
            incidencias: lookup.incidents.into_iter().map(ApiIncident::from).collect(),
        }
    }
}

/// Body returned by the connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiPing {
    /// Whether the store answered.
    pub ok: bool,
    /// Server version.
    pub version: String,
}

/// Query parameters for the incident listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentListParams {
    /// First date to include (`YYYY-MM-DD`).
    pub desde: Option<String>,
    /// Last date to include (`YYYY-MM-DD`).
    pub hasta: Option<String>,
    /// Status token (`report`, `process`, `solved`, `todos`).
    pub estado: Option<String>,
}

/// Query parameters for the query-string variant of the plate lookup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlateQueryParams {
    /// Plate to look up, free text.
    pub placa: Option<String>,
}
