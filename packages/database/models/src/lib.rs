#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Incident submission shapes, table layout, and database row types.
//!
//! These types represent data on its way into and out of the `PostGIS`
//! database. They are distinct from the JSON response types in
//! `cusco_reporta_server_models` so the API contract can evolve
//! independently of the storage layout.

use chrono::{NaiveDate, NaiveDateTime};
use cusco_reporta_incident_models::IncidentStatus;
use serde::{Deserialize, Serialize};

/// Names of the tables and view the incident core reads and writes.
///
/// The column sets of these tables are discovered at request time; only
/// the names are fixed by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentTables {
    /// Schema that owns the tables (used for catalog lookups).
    pub schema: String,
    /// Base incident table.
    pub incidents: String,
    /// Evidence table linked to incidents.
    pub evidence: String,
    /// Denormalized read view with display-ready status/category labels.
    pub panel_view: String,
}

impl Default for IncidentTables {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            incidents: "incidencias".to_string(),
            evidence: "evidencias".to_string(),
            panel_view: "vw_incidencias_panel".to_string(),
        }
    }
}

/// Raw incident submission as received from a form, before normalization.
///
/// Every field is optional here; required-field checks belong to the
/// writer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentSubmission {
    /// Incident date or date-time.
    pub fecha_incidente: Option<String>,
    /// Category reference.
    pub categoria_id: Option<String>,
    /// Vehicle plate, free text.
    pub placa: Option<String>,
    /// Short title.
    pub titulo: Option<String>,
    /// Free-text description.
    pub descripcion: Option<String>,
    /// Free-text place reference.
    pub referencia_lugar: Option<String>,
    /// District.
    pub distrito: Option<String>,
    /// Department.
    pub departamento: Option<String>,
    /// Province.
    pub provincia: Option<String>,
    /// Latitude (WGS84).
    pub lat: Option<String>,
    /// Longitude (WGS84).
    pub lng: Option<String>,
    /// Submitting user id.
    pub usuario_id: Option<String>,
    /// Explicit record kind token.
    pub tipo_registro: Option<String>,
    /// Legacy submission mode (`identificado` / `incognito`).
    pub modo: Option<String>,
}

impl IncidentSubmission {
    /// Sets the field called `name` to `value`.
    ///
    /// Returns `false` when `name` is not a submission field, in which case
    /// the value is ignored.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "fecha_incidente" => &mut self.fecha_incidente,
            "categoria_id" => &mut self.categoria_id,
            "placa" => &mut self.placa,
            "titulo" => &mut self.titulo,
            "descripcion" => &mut self.descripcion,
            "referencia_lugar" => &mut self.referencia_lugar,
            "distrito" => &mut self.distrito,
            "departamento" => &mut self.departamento,
            "provincia" => &mut self.provincia,
            "lat" => &mut self.lat,
            "lng" => &mut self.lng,
            "usuario_id" => &mut self.usuario_id,
            "tipo_registro" => &mut self.tipo_registro,
            "modo" => &mut self.modo,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Builds a submission from `(name, value)` pairs, ignoring unknown
    /// names.
    #[must_use]
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut submission = Self::default();
        for (name, value) in fields {
            submission.set(&name, value);
        }
        submission
    }
}

/// An uploaded evidence file that has already been written to the content
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFile {
    /// Generated filename under the content directory. Opaque to the core.
    pub stored_filename: String,
    /// Declared media type, if the client sent one.
    pub media_type: Option<String>,
}

/// Filter criteria for listing incidents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentFilter {
    /// First incident date to include.
    pub from: Option<NaiveDate>,
    /// Last incident date to include.
    pub to: Option<NaiveDate>,
    /// Only incidents in this status.
    pub status: Option<IncidentStatus>,
}

impl IncidentFilter {
    /// Whether no criterion is set (the capped panel listing).
    #[must_use]
    pub const fn is_unfiltered(&self) -> bool {
        self.from.is_none() && self.to.is_none() && self.status.is_none()
    }
}

/// An incident row read from the panel view joined with the base table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelIncidentRow {
    /// Primary key.
    pub id: i64,
    /// Stored record kind.
    pub tipo_registro: Option<String>,
    /// Canonical plate, from the base table.
    pub placa: Option<String>,
    /// Category label.
    pub categoria: Option<String>,
    /// Status code (`RECEIVED`, `IN_PROGRESS`, `SOLVED`).
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
    /// Longitude (WGS84).
    pub longitud: Option<f64>,
    /// Latitude (WGS84).
    pub latitud: Option<f64>,
    /// Stored point as well-known text, e.g. `POINT(-71.9 -13.5)`.
    pub ubicacion_wkt: Option<String>,
}

/// Result of looking up incidents by plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateLookup {
    /// The normalized plate that was searched.
    pub plate: String,
    /// Matching incidents, newest first.
    pub incidents: Vec<PanelIncidentRow>,
}

impl PlateLookup {
    /// Whether any incident has been reported for the plate.
    #[must_use]
    pub fn reported(&self) -> bool {
        !self.incidents.is_empty()
    }

    /// Number of matching incidents returned.
    #[must_use]
    pub fn total(&self) -> usize {
        self.incidents.len()
    }
}
