#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for Cusco Reporta.
//!
//! Accepts citizen incident reports with optional photo evidence, and
//! serves the panel listing and plate lookups from the `PostGIS` database.
//! Uploaded evidence files are served back from `/uploads`.

pub mod config;
mod handlers;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use cusco_reporta_database::db;
use cusco_reporta_database::report::{FailureReporter, LogReporter};
use cusco_reporta_database::store::{IncidentStore, PostgresStore};
use cusco_reporta_database::writer::WriterConfig;
use cusco_reporta_database_models::IncidentTables;

use crate::config::ServerConfig;

/// Shared application state.
pub struct AppState {
    /// Relational store for incidents and evidence.
    pub store: Arc<dyn IncidentStore>,
    /// Incident, evidence, and panel view names.
    pub tables: IncidentTables,
    /// Validation and defaulting rules for new incidents.
    pub writer: WriterConfig,
    /// Destination for write-path failure reports.
    pub reporter: Arc<dyn FailureReporter>,
    /// Directory evidence files are written to.
    pub upload_dir: PathBuf,
    /// Maximum accepted evidence file size in bytes.
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Builds the state for `config` on top of `store`, reporting failures
    /// to the log.
    #[must_use]
    pub fn new(config: &ServerConfig, store: Arc<dyn IncidentStore>) -> Self {
        Self {
            store,
            tables: config.tables.clone(),
            writer: config.write_profile.config(),
            reporter: Arc::new(LogReporter),
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Registers the API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(handlers::ping)).service(
        web::scope("/incidencias")
            .route("", web::get().to(handlers::list_incidents))
            .route("", web::post().to(handlers::create_incident))
            .route("/placa", web::get().to(handlers::plate_by_query))
            .route("/placa/{placa}", web::get().to(handlers::plate_by_path)),
    );
}

/// Starts the Cusco Reporta API server.
///
/// Reads the configuration, creates the upload directory, connects to the
/// `PostGIS` database, and starts the Actix-Web HTTP server. The caller
/// provides the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the configuration is invalid, the
/// upload directory cannot be created, the database is unreachable, or
/// the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env().map_err(std::io::Error::other)?;
    config.prepare_upload_dir()?;

    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to database: {e}")))?;

    let store: Arc<dyn IncidentStore> = Arc::new(PostgresStore::new(db_conn));
    let state = web::Data::new(AppState::new(&config, store));

    log::info!(
        "Writing incidents to {}.{} with the {:?} profile",
        config.tables.schema,
        config.tables.incidents,
        config.write_profile
    );
    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    let upload_dir = config.upload_dir.clone();

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
            // Serve stored evidence files
            .service(Files::new("/uploads", upload_dir.clone()))
    })
    .bind((config.bind_addr.clone(), config.port))?
    .run()
    .await
}
