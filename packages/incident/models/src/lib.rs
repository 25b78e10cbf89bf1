#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Incident record kinds, status vocabulary, and field normalization.
//!
//! This crate defines the canonical values stored for citizen-submitted
//! incidents and the pure normalization functions applied to raw form input
//! before it reaches the database. The same plate normalization is used on
//! the write path and the read path so lookups always compare like with like.

pub mod normalize;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Department stored when the submission does not name one.
pub const DEFAULT_DEPARTMENT: &str = "Cusco";

/// Province stored when the submission does not name one.
pub const DEFAULT_PROVINCE: &str = "Cusco";

/// City-center longitude (WGS84) used when a point is required but missing.
pub const DEFAULT_LONGITUDE: f64 = -71.967_46;

/// City-center latitude (WGS84) used when a point is required but missing.
pub const DEFAULT_LATITUDE: f64 = -13.531_95;

/// Status id assigned to every new incident ("received").
pub const INITIAL_STATUS_ID: i64 = 1;

/// Formality of an incident record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(ascii_case_insensitive)]
pub enum RecordKind {
    /// Anonymous-style report.
    #[strum(to_string = "REPORT", serialize = "REPORTE")]
    Report,
    /// Identified denunciation.
    #[strum(to_string = "DENUNCIATION", serialize = "DENUNCIA")]
    Denunciation,
}

impl RecordKind {
    /// Derives a record kind from the legacy submission mode flag.
    ///
    /// Only an identified submission becomes a [`Self::Denunciation`].
    #[must_use]
    pub fn from_mode(mode: Option<&str>) -> Self {
        match mode.map(str::trim) {
            Some(m)
                if m.eq_ignore_ascii_case("identified")
                    || m.eq_ignore_ascii_case("identificado") =>
            {
                Self::Denunciation
            }
            _ => Self::Report,
        }
    }
}

/// Processing status of an incident as exposed by the panel view.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    /// Submitted and awaiting attention.
    Received,
    /// Being handled by staff.
    InProgress,
    /// Closed as solved.
    Solved,
}

impl IncidentStatus {
    /// Maps a listing filter token to a status.
    ///
    /// Returns `None` for `all`/`todos`, an empty token, or any token outside
    /// the vocabulary, all of which mean "do not filter by status".
    #[must_use]
    pub fn from_filter_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "report" | "reporte" => Some(Self::Received),
            "process" | "proceso" => Some(Self::InProgress),
            "solved" | "solucionado" => Some(Self::Solved),
            _ => None,
        }
    }
}
