//! Server configuration read from the environment.

use std::path::PathBuf;

use cusco_reporta_database::writer::WriteProfile;
use cusco_reporta_database_models::IncidentTables;

use crate::upload::MAX_UPLOAD_BYTES;

/// Errors from reading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set to a value that cannot be used.
    #[error("Invalid {name}: {message}")]
    Invalid {
        /// Environment variable name.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },
}

/// Settings resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Port to bind to.
    pub port: u16,
    /// Directory uploaded evidence files are written to.
    pub upload_dir: PathBuf,
    /// Maximum accepted evidence file size in bytes.
    pub max_upload_bytes: usize,
    /// Incident, evidence, and panel view names.
    pub tables: IncidentTables,
    /// Write profile for `POST /incidencias`.
    pub write_profile: WriteProfile,
}

impl ServerConfig {
    /// Reads `BIND_ADDR`, `PORT`, `UPLOAD_DIR`, `DB_SCHEMA`, and
    /// `INCIDENT_WRITE_PROFILE`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `PORT` or `INCIDENT_WRITE_PROFILE` is set
    /// to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `PORT` or `INCIDENT_WRITE_PROFILE` is set
    /// to an unusable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(p) => p.trim().parse().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                message: format!("{p:?}: {e}"),
            })?,
            None => 8080,
        };

        let write_profile = match var("INCIDENT_WRITE_PROFILE") {
            Some(p) => p.parse().map_err(|message| ConfigError::Invalid {
                name: "INCIDENT_WRITE_PROFILE",
                message,
            })?,
            None => WriteProfile::default(),
        };

        let mut tables = IncidentTables::default();
        if let Some(schema) = var("DB_SCHEMA") {
            tables.schema = schema;
        }

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            upload_dir: var("UPLOAD_DIR").map_or_else(|| PathBuf::from("uploads"), PathBuf::from),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            tables,
            write_profile,
        })
    }

    /// Creates the upload directory if it does not exist.
    ///
    /// Called once before the HTTP server binds, never per request.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn prepare_upload_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        log::info!("Evidence uploads go to {}", self.upload_dir.display());
        Ok(())
    }
}
