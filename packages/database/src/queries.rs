//! Panel read queries.
//!
//! Both the filtered listing and the plate lookup read the panel view joined
//! with the base incident table (the view carries no plate). The stored
//! point is always returned as well-known text.

use std::fmt::Write as _;

use chrono::{Days, NaiveTime};
use cusco_reporta_database_models::{
    IncidentFilter, IncidentTables, PanelIncidentRow, PlateLookup,
};
use cusco_reporta_incident_models::normalize::normalize_plate;
use switchy_database::DatabaseValue;

use crate::IncidentError;
use crate::report::{FailureKind, FailureReporter};
use crate::schema::qualified;
use crate::store::{IncidentStore, Statement};

/// Maximum rows returned by the unfiltered panel listing.
pub const PANEL_LIMIT: u32 = 200;

/// Maximum rows returned by a plate lookup.
pub const PLATE_LOOKUP_LIMIT: u32 = 50;

fn select_panel(tables: &IncidentTables) -> String {
    format!(
        "SELECT v.id::bigint AS id,
                v.tipo_registro::text AS tipo_registro,
                i.placa::text AS placa,
                v.categoria::text AS categoria,
                v.estado_codigo::text AS estado_codigo,
                v.estado_nombre::text AS estado_nombre,
                v.titulo::text AS titulo,
                v.descripcion::text AS descripcion,
                v.fecha_incidente::timestamp AS fecha_incidente,
                v.departamento::text AS departamento,
                v.provincia::text AS provincia,
                v.distrito::text AS distrito,
                v.referencia_lugar::text AS referencia_lugar,
                v.longitud::double precision AS longitud,
                v.latitud::double precision AS latitud,
                ST_AsText(v.ubicacion) AS ubicacion_wkt
         FROM {} v
         JOIN {} i ON i.id = v.id",
        qualified(tables, &tables.panel_view),
        qualified(tables, &tables.incidents),
    )
}

/// Builds the listing query for `filter`.
///
/// Only supplied criteria constrain the result. Date bounds are inclusive
/// whole days. The [`PANEL_LIMIT`] cap applies to the unfiltered listing
/// only.
#[must_use]
pub fn build_list_query(tables: &IncidentTables, filter: &IncidentFilter) -> Statement {
    let mut sql = select_panel(tables);
    let mut conditions = Vec::new();
    let mut params: Vec<DatabaseValue> = Vec::new();

    if let Some(from) = filter.from {
        params.push(DatabaseValue::DateTime(from.and_time(NaiveTime::MIN)));
        conditions.push(format!("v.fecha_incidente >= ${}::timestamp", params.len()));
    }

    if let Some(to) = filter.to {
        match to.checked_add_days(Days::new(1)) {
            Some(next) => {
                params.push(DatabaseValue::DateTime(next.and_time(NaiveTime::MIN)));
                conditions.push(format!("v.fecha_incidente < ${}::timestamp", params.len()));
            }
            // Last representable day: nothing can lie after it.
            None => log::debug!("Ignoring upper date bound {to}"),
        }
    }

    if let Some(status) = filter.status {
        params.push(DatabaseValue::String(status.as_ref().to_string()));
        conditions.push(format!("v.estado_codigo = ${}", params.len()));
    }

    if !conditions.is_empty() {
        write!(sql, " WHERE {}", conditions.join(" AND ")).unwrap();
    }

    sql.push_str(" ORDER BY v.id DESC");

    if filter.is_unfiltered() {
        write!(sql, " LIMIT {PANEL_LIMIT}").unwrap();
    }

    Statement { sql, params }
}

/// Builds the lookup query for an already normalized plate.
#[must_use]
pub fn build_plate_query(tables: &IncidentTables, plate: &str) -> Statement {
    let mut sql = select_panel(tables);
    write!(sql, " WHERE i.placa = $1 ORDER BY v.id DESC LIMIT {PLATE_LOOKUP_LIMIT}").unwrap();

    Statement {
        sql,
        params: vec![DatabaseValue::String(plate.to_string())],
    }
}

/// Lists incidents matching `filter`, newest first.
///
/// # Errors
///
/// Returns [`IncidentError::Store`] if the query fails. The failure is
/// also sent to `reporter`.
pub async fn list_incidents<S: IncidentStore + ?Sized>(
    store: &S,
    tables: &IncidentTables,
    filter: &IncidentFilter,
    reporter: &dyn FailureReporter,
) -> Result<Vec<PanelIncidentRow>, IncidentError> {
    let statement = build_list_query(tables, filter);
    let rows = store.fetch_incidents(&statement).await.inspect_err(|e| {
        reporter.report(FailureKind::Store, &format!("Failed to list incidents: {e}"));
    })?;
    log::debug!("Listed {} incidents for {filter:?}", rows.len());
    Ok(rows)
}

/// Looks up incidents reported for a plate.
///
/// The plate is normalized exactly as on the write path before comparing.
/// A plate with no incidents is a normal, empty result. Failures are also
/// sent to `reporter`.
///
/// # Errors
///
/// * [`IncidentError::InvalidField`] if the plate is empty after
///   normalization
/// * [`IncidentError::Store`] if the query fails
pub async fn incidents_by_plate<S: IncidentStore + ?Sized>(
    store: &S,
    tables: &IncidentTables,
    raw_plate: &str,
    reporter: &dyn FailureReporter,
) -> Result<PlateLookup, IncidentError> {
    let plate = normalize_plate(Some(raw_plate));
    if plate.is_empty() {
        let err = IncidentError::InvalidField {
            field: "placa",
            message: "plate is empty after normalization".to_string(),
        };
        reporter.report(FailureKind::Validation, &format!("Rejected plate lookup: {err}"));
        return Err(err);
    }

    let incidents = store
        .fetch_incidents(&build_plate_query(tables, &plate))
        .await
        .inspect_err(|e| {
            reporter.report(
                FailureKind::Store,
                &format!("Failed to look up plate {plate}: {e}"),
            );
        })?;

    Ok(PlateLookup { plate, incidents })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use cusco_reporta_incident_models::IncidentStatus;

    use super::*;
    use crate::testing::{RecordingReporter, RecordingStore};

    fn row(id: i64, plate: &str) -> PanelIncidentRow {
        PanelIncidentRow {
            id,
            tipo_registro: Some("REPORT".to_string()),
            placa: Some(plate.to_string()),
            categoria: Some("Vias".to_string()),
            estado_codigo: Some("RECEIVED".to_string()),
            estado_nombre: Some("Recibido".to_string()),
            titulo: Some("Bache".to_string()),
            descripcion: Some("Hueco grande".to_string()),
            fecha_incidente: NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            departamento: Some("Cusco".to_string()),
            provincia: Some("Cusco".to_string()),
            distrito: None,
            referencia_lugar: None,
            longitud: Some(-71.9),
            latitud: Some(-13.5),
            ubicacion_wkt: Some("POINT(-71.9 -13.5)".to_string()),
        }
    }

    #[test]
    fn unfiltered_listing_is_capped() {
        let statement = build_list_query(&IncidentTables::default(), &IncidentFilter::default());
        assert!(statement.sql.contains("FROM \"public\".\"vw_incidencias_panel\" v"));
        assert!(statement.sql.contains("JOIN \"public\".\"incidencias\" i ON i.id = v.id"));
        assert!(statement.sql.contains("ST_AsText(v.ubicacion) AS ubicacion_wkt"));
        assert!(!statement.sql.contains("WHERE"));
        assert!(statement.sql.ends_with("ORDER BY v.id DESC LIMIT 200"));
        assert!(statement.params.is_empty());
    }

    #[test]
    fn only_supplied_filters_apply() {
        let filter = IncidentFilter {
            status: Some(IncidentStatus::InProgress),
            ..IncidentFilter::default()
        };
        let statement = build_list_query(&IncidentTables::default(), &filter);
        assert!(statement.sql.contains(" WHERE v.estado_codigo = $1 ORDER BY v.id DESC"));
        assert!(!statement.sql.contains("LIMIT"));
        assert_eq!(statement.params.len(), 1);
        assert!(format!("{:?}", statement.params[0]).contains("IN_PROGRESS"));
    }

    #[test]
    fn date_bounds_cover_whole_days() {
        let filter = IncidentFilter {
            from: NaiveDate::from_ymd_opt(2024, 5, 1),
            to: NaiveDate::from_ymd_opt(2024, 5, 31),
            status: None,
        };
        let statement = build_list_query(&IncidentTables::default(), &filter);
        assert!(statement.sql.contains(
            " WHERE v.fecha_incidente >= $1::timestamp AND v.fecha_incidente < $2::timestamp"
        ));

        let expected = [
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        ];
        for (param, date) in statement.params.iter().zip(expected) {
            match param {
                DatabaseValue::DateTime(dt) => assert_eq!(*dt, date.and_time(NaiveTime::MIN)),
                other => panic!("unexpected param: {other:?}"),
            }
        }
    }

    #[test]
    fn plate_query_is_bound_and_capped() {
        let statement = build_plate_query(&IncidentTables::default(), "ABC-123");
        assert!(statement.sql.ends_with("WHERE i.placa = $1 ORDER BY v.id DESC LIMIT 50"));
        assert!(!statement.sql.contains("ABC-123"));
        assert!(format!("{:?}", statement.params[0]).contains("ABC-123"));
    }

    #[tokio::test]
    async fn unknown_plate_is_empty_not_error() {
        let store = RecordingStore::new(&["id"], &[]);
        let reporter = RecordingReporter::default();
        let lookup = incidents_by_plate(&store, &IncidentTables::default(), "ABC-123", &reporter)
            .await
            .unwrap();
        assert_eq!(lookup.plate, "ABC-123");
        assert!(!lookup.reported());
        assert_eq!(lookup.total(), 0);
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn plate_is_normalized_before_lookup() {
        let store = RecordingStore::new(&["id"], &[]).with_rows(vec![row(9, "X1A123")]);
        let reporter = RecordingReporter::default();
        let lookup = incidents_by_plate(&store, &IncidentTables::default(), " x1a 123 ", &reporter)
            .await
            .unwrap();
        assert_eq!(lookup.plate, "X1A123");
        assert!(lookup.reported());
        assert_eq!(lookup.total(), 1);

        let statements = store.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].params,
            vec![format!("{:?}", DatabaseValue::String("X1A123".to_string()))]
        );
    }

    #[tokio::test]
    async fn blank_plate_is_rejected() {
        let store = RecordingStore::new(&["id"], &[]);
        let reporter = RecordingReporter::default();
        let err = incidents_by_plate(&store, &IncidentTables::default(), " *** ", &reporter)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(store.statements().is_empty());
        assert_eq!(reporter.kinds(), vec![FailureKind::Validation]);
    }

    #[tokio::test]
    async fn lists_rows_from_store() {
        let store = RecordingStore::new(&["id"], &[])
            .with_rows(vec![row(3, "ABC-123"), row(2, "ABC-123")]);
        let reporter = RecordingReporter::default();
        let rows = list_incidents(
            &store,
            &IncidentTables::default(),
            &IncidentFilter::default(),
            &reporter,
        )
        .await
        .unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[tokio::test]
    async fn listing_failure_is_reported() {
        let store = RecordingStore::new(&["id"], &[]).failing_fetch();
        let reporter = RecordingReporter::default();
        let err = list_incidents(
            &store,
            &IncidentTables::default(),
            &IncidentFilter::default(),
            &reporter,
        )
        .await
        .unwrap_err();
        assert!(!err.is_validation());

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, FailureKind::Store);
        assert!(reports[0].1.contains("panel view is unavailable"));
    }

    #[tokio::test]
    async fn plate_lookup_failure_is_reported() {
        let store = RecordingStore::new(&["id"], &[]).failing_fetch();
        let reporter = RecordingReporter::default();
        let err = incidents_by_plate(&store, &IncidentTables::default(), "abc 123", &reporter)
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Store(_)));

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, FailureKind::Store);
        assert!(reports[0].1.contains("ABC123"));
    }
}
