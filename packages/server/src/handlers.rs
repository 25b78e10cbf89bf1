//! HTTP handler functions for the Cusco Reporta API.

use actix_multipart::Multipart;
use actix_web::{HttpMessage as _, HttpRequest, HttpResponse, web};
use chrono::NaiveDate;
use cusco_reporta_database::evidence::EvidenceOutcome;
use cusco_reporta_database::report::FailureKind;
use cusco_reporta_database::{IncidentError, queries, writer};
use cusco_reporta_database_models::IncidentFilter;
use cusco_reporta_incident_models::IncidentStatus;
use cusco_reporta_server_models::{
    ApiCreated, ApiError, ApiIncidentList, ApiPing, ApiPlateLookup, IncidentListParams,
    PlateQueryParams,
};

use crate::AppState;
use crate::upload::{self, ParsedSubmission, UploadError};

/// `GET /ping`
pub async fn ping(state: web::Data<AppState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().json(ApiPing {
            ok: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
        Err(e) => {
            state
                .reporter
                .report(FailureKind::Store, &format!("Store ping failed: {e}"));
            HttpResponse::InternalServerError().json(ApiError::new(e.to_string()))
        }
    }
}

/// `POST /incidencias`
///
/// Accepts `multipart/form-data` (with an optional `archivo` file) or
/// `application/json`. Responds `201` once the incident row exists, even
/// if the evidence row could not be written.
pub async fn create_incident(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Payload,
) -> HttpResponse {
    let parsed = if req.content_type().eq_ignore_ascii_case("application/json") {
        upload::read_json(payload, state.max_upload_bytes)
            .await
            .map(|submission| ParsedSubmission {
                submission,
                upload: None,
            })
    } else {
        upload::read_multipart(
            Multipart::new(req.headers(), payload),
            &state.upload_dir,
            state.max_upload_bytes,
        )
        .await
    };

    let ParsedSubmission { submission, upload } = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return upload_error_response(&e),
    };

    let result = writer::submit_incident(
        state.store.as_ref(),
        &state.tables,
        &state.writer,
        &submission,
        upload.as_ref().map(|u| &u.file),
        state.reporter.as_ref(),
    )
    .await;

    match result {
        Ok(submitted) => {
            let message = match submitted.evidence {
                Some(EvidenceOutcome::Skipped(_) | EvidenceOutcome::Failed(_)) => {
                    "Incident registered; the evidence file was not linked"
                }
                Some(EvidenceOutcome::Inserted) | None => "Incident registered",
            };

            HttpResponse::Created().json(ApiCreated {
                ok: true,
                message: message.to_string(),
                id: submitted.id,
                placa: submitted.plate,
            })
        }
        Err(e) => {
            if let Some(upload) = upload {
                upload.discard().await;
            }
            incident_error_response(&e)
        }
    }
}

/// `GET /incidencias?desde&hasta&estado`
pub async fn list_incidents(
    state: web::Data<AppState>,
    params: web::Query<IncidentListParams>,
) -> HttpResponse {
    let filter = match parse_filter(&params) {
        Ok(filter) => filter,
        Err(message) => return HttpResponse::BadRequest().json(ApiError::new(message)),
    };

    match queries::list_incidents(
        state.store.as_ref(),
        &state.tables,
        &filter,
        state.reporter.as_ref(),
    )
    .await
    {
        Ok(rows) => HttpResponse::Ok().json(ApiIncidentList::from(rows)),
        Err(e) => incident_error_response(&e),
    }
}

/// `GET /incidencias/placa/{placa}`
pub async fn plate_by_path(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    plate_lookup(&state, &path.into_inner()).await
}

/// `GET /incidencias/placa?placa=`
pub async fn plate_by_query(
    state: web::Data<AppState>,
    params: web::Query<PlateQueryParams>,
) -> HttpResponse {
    plate_lookup(&state, params.placa.as_deref().unwrap_or_default()).await
}

async fn plate_lookup(state: &AppState, raw_plate: &str) -> HttpResponse {
    match queries::incidents_by_plate(
        state.store.as_ref(),
        &state.tables,
        raw_plate,
        state.reporter.as_ref(),
    )
    .await
    {
        Ok(lookup) => HttpResponse::Ok().json(ApiPlateLookup::from(lookup)),
        Err(e) => incident_error_response(&e),
    }
}

fn parse_filter(params: &IncidentListParams) -> Result<IncidentFilter, String> {
    Ok(IncidentFilter {
        from: parse_date_param("desde", params.desde.as_deref())?,
        to: parse_date_param("hasta", params.hasta.as_deref())?,
        status: params
            .estado
            .as_deref()
            .and_then(IncidentStatus::from_filter_token),
    })
}

fn parse_date_param(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>, String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("Invalid value for {name}: expected YYYY-MM-DD, got {v:?}")),
    }
}

fn incident_error_response(e: &IncidentError) -> HttpResponse {
    if e.is_validation() {
        HttpResponse::BadRequest().json(ApiError::new(e.to_string()))
    } else {
        HttpResponse::InternalServerError().json(ApiError::new(e.to_string()))
    }
}

fn upload_error_response(e: &UploadError) -> HttpResponse {
    log::warn!("Rejected incident body: {e}");

    match e {
        UploadError::TooLarge { .. } => {
            HttpResponse::PayloadTooLarge().json(ApiError::new(e.to_string()))
        }
        UploadError::Io { .. } => HttpResponse::InternalServerError()
            .json(ApiError::new("Failed to store the evidence file")),
        UploadError::Multipart(_)
        | UploadError::Payload(_)
        | UploadError::Json(_)
        | UploadError::NotAnObject
        | UploadError::InvalidTextField { .. } => {
            HttpResponse::BadRequest().json(ApiError::new(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use actix_web::body::MessageBody;
    use actix_web::dev::ServiceResponse;
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test};
    use cusco_reporta_database::report::{FailureKind, FailureReporter};
    use cusco_reporta_database::store::IncidentStore;
    use cusco_reporta_database::testing::{RecordingReporter, RecordingStore};
    use cusco_reporta_database::writer::WriterConfig;
    use cusco_reporta_database_models::IncidentTables;
    use serde_json::{Value, json};

    use crate::upload::MAX_UPLOAD_BYTES;
    use crate::{AppState, configure};

    const INCIDENT_COLUMNS: &[&str] = &[
        "id",
        "tipo_registro",
        "estado_id",
        "fecha_incidente",
        "categoria_id",
        "placa",
        "titulo",
        "descripcion",
        "departamento",
        "provincia",
        "distrito",
        "referencia_lugar",
        "ubicacion",
        "usuario_id",
    ];

    const EVIDENCE_COLUMNS: &[&str] = &["id", "incidencia_id", "archivo", "tipo"];

    const BOUNDARY: &str = "cuscoReportaBoundary";

    struct Harness {
        store: Arc<RecordingStore>,
        reporter: Arc<RecordingReporter>,
        state: actix_web::web::Data<AppState>,
        dir: PathBuf,
    }

    impl Harness {
        fn new(max_upload_bytes: usize) -> Self {
            Self::with_store(
                RecordingStore::new(INCIDENT_COLUMNS, EVIDENCE_COLUMNS),
                max_upload_bytes,
            )
        }

        fn with_store(store: RecordingStore, max_upload_bytes: usize) -> Self {
            let dir =
                std::env::temp_dir().join(format!("cusco_reporta_http_{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();

            let store = Arc::new(store);
            let reporter = Arc::new(RecordingReporter::default());
            let state = actix_web::web::Data::new(AppState {
                store: Arc::clone(&store) as Arc<dyn IncidentStore>,
                tables: IncidentTables::default(),
                writer: WriterConfig::citizen(),
                reporter: Arc::clone(&reporter) as Arc<dyn FailureReporter>,
                upload_dir: dir.clone(),
                max_upload_bytes,
            });

            Self {
                store,
                reporter,
                state,
                dir,
            }
        }

        fn files(&self) -> Vec<String> {
            files_in(&self.dir)
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn bache() -> Value {
        json!({
            "fecha_incidente": "2024-05-01",
            "titulo": "Bache",
            "descripcion": "Hueco grande",
            "categoria_id": "3",
            "lat": "-13.5",
            "lng": "-71.9",
        })
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"archivo\"; \
                     filename=\"bache.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/incidencias")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    const BACHE_FIELDS: &[(&str, &str)] = &[
        ("fecha_incidente", "2024-05-01"),
        ("titulo", "Bache"),
        ("descripcion", "Hueco grande"),
        ("categoria_id", "3"),
        ("placa", "x1a 123"),
    ];

    #[actix_web::test]
    async fn creates_incident_from_json() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/incidencias")
            .set_json(bache())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["id"], 1);
        assert_eq!(body["placa"], Value::Null);
        assert_eq!(harness.store.inserts_into("incidencias"), 1);
    }

    #[actix_web::test]
    async fn json_numbers_are_accepted() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let mut payload = bache();
        payload["categoria_id"] = json!(3);
        payload["lat"] = json!(-13.5);
        payload["lng"] = json!(-71.9);

        let req = test::TestRequest::post()
            .uri("/incidencias")
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn missing_fields_are_rejected_without_writes() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/incidencias")
            .set_json(json!({ "fecha_incidente": "2024-05-01", "categoria_id": "3" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["ok"], false);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("titulo"));
        assert!(message.contains("descripcion"));
        assert!(harness.store.statements().is_empty());
    }

    #[actix_web::test]
    async fn multipart_with_evidence() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req =
            multipart_request(multipart_body(BACHE_FIELDS, Some(&b"jpeg bytes"[..]))).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["placa"], "X1A123");
        assert_eq!(body["message"], "Incident registered");

        let files = harness.files();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("ev_"));
        assert!(files[0].ends_with(".jpg"));

        let statements = harness.store.statements();
        assert_eq!(harness.store.inserts_into("evidencias"), 1);
        assert!(statements[1].params[1].contains(&files[0]));
        assert!(statements[1].params[2].contains("image/jpeg"));
    }

    #[actix_web::test]
    async fn oversized_evidence_is_413() {
        let harness = Harness::new(8);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req =
            multipart_request(multipart_body(BACHE_FIELDS, Some(&[7u8; 32][..]))).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(harness.files().is_empty());
        assert!(harness.store.statements().is_empty());
    }

    #[actix_web::test]
    async fn rejected_submission_discards_file() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let body = multipart_body(&[("titulo", "Bache")], Some(&b"jpeg bytes"[..]));
        let req = multipart_request(body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(harness.files().is_empty());
    }

    #[actix_web::test]
    async fn lists_with_status_filter() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/incidencias?estado=solved&desde=2024-05-01")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "ok": true, "incidencias": [], "total": 0 }));

        let statements = harness.store.statements();
        assert!(statements[0].sql.contains("v.estado_codigo = $2"));
        assert!(!statements[0].sql.contains("LIMIT"));
    }

    #[actix_web::test]
    async fn malformed_date_is_400() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/incidencias?hasta=31-05-2024")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(harness.store.statements().is_empty());
    }

    #[actix_web::test]
    async fn unknown_plate_is_not_reported() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/incidencias/placa/ABC-123")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({
                "ok": true,
                "placa": "ABC-123",
                "reportado": false,
                "total": 0,
                "incidencias": [],
            })
        );
    }

    #[actix_web::test]
    async fn plate_query_variant_normalizes() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/incidencias/placa?placa=abc-123")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["placa"], "ABC-123");

        let req = test::TestRequest::get()
            .uri("/incidencias/placa?placa=%2A%2A")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn ping_reports_version() {
        let harness = Harness::new(MAX_UPLOAD_BYTES);
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/ping").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    async fn assert_store_error<B: MessageBody>(resp: ServiceResponse<B>, store_text: &str) {
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["ok"], false);
        assert!(body["message"].as_str().unwrap().contains(store_text));
    }

    #[actix_web::test]
    async fn failed_insert_is_500_and_discards_file() {
        let harness = Harness::with_store(
            RecordingStore::new(INCIDENT_COLUMNS, EVIDENCE_COLUMNS).failing_insert(),
            MAX_UPLOAD_BYTES,
        );
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req =
            multipart_request(multipart_body(BACHE_FIELDS, Some(&b"jpeg bytes"[..]))).to_request();
        let resp = test::call_service(&app, req).await;
        assert_store_error(resp, "incident table is locked").await;

        assert!(harness.files().is_empty());
        assert_eq!(harness.store.inserts_into("evidencias"), 0);
        assert_eq!(harness.reporter.kinds(), vec![FailureKind::Store]);
    }

    #[actix_web::test]
    async fn failed_listing_is_500() {
        let harness = Harness::with_store(
            RecordingStore::new(INCIDENT_COLUMNS, EVIDENCE_COLUMNS).failing_fetch(),
            MAX_UPLOAD_BYTES,
        );
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/incidencias").to_request();
        let resp = test::call_service(&app, req).await;
        assert_store_error(resp, "panel view is unavailable").await;
        assert_eq!(harness.reporter.kinds(), vec![FailureKind::Store]);
    }

    #[actix_web::test]
    async fn failed_plate_lookup_is_500() {
        let harness = Harness::with_store(
            RecordingStore::new(INCIDENT_COLUMNS, EVIDENCE_COLUMNS).failing_fetch(),
            MAX_UPLOAD_BYTES,
        );
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/incidencias/placa/ABC-123")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_store_error(resp, "panel view is unavailable").await;
        assert_eq!(harness.reporter.kinds(), vec![FailureKind::Store]);
    }

    #[actix_web::test]
    async fn failed_ping_is_500() {
        let harness = Harness::with_store(
            RecordingStore::new(INCIDENT_COLUMNS, EVIDENCE_COLUMNS).failing_ping(),
            MAX_UPLOAD_BYTES,
        );
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/ping").to_request();
        let resp = test::call_service(&app, req).await;
        assert_store_error(resp, "connection refused").await;
        assert_eq!(harness.reporter.kinds(), vec![FailureKind::Store]);
    }
}
