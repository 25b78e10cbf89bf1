//! Field normalization for incident submissions.
//!
//! Every function here is pure and total: any input, including missing
//! input, produces a canonical value. Plate normalization is applied
//! symmetrically at write time and at lookup time.

use regex::Regex;
use std::sync::LazyLock;

use crate::RecordKind;

/// Characters that may not appear in a canonical plate.
static PLATE_DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Z0-9-]+").expect("valid regex"));

/// Trims a raw value, collapsing empty or whitespace-only input to `None`.
#[must_use]
pub fn clean_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Canonicalizes a vehicle plate.
///
/// The pipeline:
/// 1. Uppercase
/// 2. Strip whitespace and every character outside `[A-Z0-9-]`
///
/// Missing input yields an empty string. Callers storing the plate must
/// turn the empty string into a null with [`plate_or_none`].
#[must_use]
pub fn normalize_plate(value: Option<&str>) -> String {
    let upper = value.unwrap_or_default().to_uppercase();
    PLATE_DISALLOWED_RE.replace_all(&upper, "").into_owned()
}

/// Canonicalizes a plate for storage, mapping an empty result to `None`.
#[must_use]
pub fn plate_or_none(value: Option<&str>) -> Option<String> {
    let plate = normalize_plate(value);
    if plate.is_empty() { None } else { Some(plate) }
}

/// Parses a number, treating blank, malformed, and non-finite input as
/// absent.
#[must_use]
pub fn parse_number_or_null(value: Option<&str>) -> Option<f64> {
    let cleaned = clean_text(value)?;
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parses an integral identifier such as a category or user id.
///
/// Fractional values are rejected rather than truncated.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn parse_id_or_null(value: Option<&str>) -> Option<i64> {
    // 2^63: exactly representable, unlike `i64::MAX`.
    const UPPER: f64 = -(i64::MIN as f64);

    let n = parse_number_or_null(value)?;
    if n.fract() != 0.0 || n < i64::MIN as f64 || n >= UPPER {
        return None;
    }
    Some(n as i64)
}

/// Resolves the record kind of a submission.
///
/// An explicit kind token wins when present. A recognized token is used
/// as-is and any other explicit token is coerced to [`RecordKind::Report`].
/// Without an explicit token the legacy mode flag decides.
#[must_use]
pub fn resolve_record_kind(explicit: Option<&str>, mode: Option<&str>) -> RecordKind {
    clean_text(explicit).map_or_else(
        || RecordKind::from_mode(mode),
        |token| token.parse().unwrap_or(RecordKind::Report),
    )
}
