//! The relational store capability used by the incident core.
//!
//! Operations take an [`IncidentStore`] rather than a raw connection so the
//! write and read paths can run against an in-memory double in tests.
//! [`PostgresStore`] is the production implementation on top of
//! `switchy_database`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use cusco_reporta_database_models::PanelIncidentRow;
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;

/// A parameterized SQL statement with `$n` placeholders.
#[derive(Debug, Clone)]
pub struct Statement {
    /// SQL text. Never contains user-supplied values.
    pub sql: String,
    /// Bound parameters, in placeholder order.
    pub params: Vec<DatabaseValue>,
}

/// Capabilities the incident core needs from the relational store.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Returns the names of the columns currently defined on
    /// `schema.table`. An unknown table yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the catalog query fails.
    async fn table_columns(&self, schema: &str, table: &str) -> Result<BTreeSet<String>, DbError>;

    /// Runs an `INSERT ... RETURNING id` statement and returns the new id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the statement fails or returns no id.
    async fn insert_returning_id(&self, statement: &Statement) -> Result<i64, DbError>;

    /// Runs a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the statement fails.
    async fn execute(&self, statement: &Statement) -> Result<u64, DbError>;

    /// Runs a panel read query and decodes the resulting rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn fetch_incidents(
        &self,
        statement: &Statement,
    ) -> Result<Vec<PanelIncidentRow>, DbError>;

    /// Checks that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the probe query fails.
    async fn ping(&self) -> Result<(), DbError>;
}

/// [`IncidentStore`] backed by a `PostgreSQL`/`PostGIS` connection.
pub struct PostgresStore {
    db: Box<dyn Database>,
}

impl PostgresStore {
    /// Wraps an open database connection.
    #[must_use]
    pub fn new(db: Box<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IncidentStore for PostgresStore {
    async fn table_columns(&self, schema: &str, table: &str) -> Result<BTreeSet<String>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT column_name::text AS column_name
                 FROM information_schema.columns
                 WHERE table_schema::text = $1 AND table_name::text = $2",
                &[
                    DatabaseValue::String(schema.to_string()),
                    DatabaseValue::String(table.to_string()),
                ],
            )
            .await?;

        let mut columns = BTreeSet::new();
        for row in &rows {
            let name: String = row.to_value("column_name").map_err(|e| DbError::Conversion {
                message: format!("Failed to parse column name: {e}"),
            })?;
            columns.insert(name);
        }

        log::trace!("Observed {} columns on {schema}.{table}", columns.len());
        Ok(columns)
    }

    async fn insert_returning_id(&self, statement: &Statement) -> Result<i64, DbError> {
        let rows = self
            .db
            .query_raw_params(&statement.sql, &statement.params)
            .await?;

        let row = rows.first().ok_or_else(|| DbError::Conversion {
            message: "INSERT returned no id".to_string(),
        })?;

        let id: i64 = row.to_value("id").map_err(|e| DbError::Conversion {
            message: format!("Failed to parse inserted id: {e}"),
        })?;

        Ok(id)
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, DbError> {
        Ok(self
            .db
            .exec_raw_params(&statement.sql, &statement.params)
            .await?)
    }

    async fn fetch_incidents(
        &self,
        statement: &Statement,
    ) -> Result<Vec<PanelIncidentRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(&statement.sql, &statement.params)
            .await?;

        let mut incidents = Vec::with_capacity(rows.len());

        for row in &rows {
            let id: i64 = row.to_value("id").map_err(|e| DbError::Conversion {
                message: format!("Failed to parse incident id: {e}"),
            })?;

            incidents.push(PanelIncidentRow {
                id,
                tipo_registro: row.to_value("tipo_registro").unwrap_or(None),
                placa: row.to_value("placa").unwrap_or(None),
                categoria: row.to_value("categoria").unwrap_or(None),
                estado_codigo: row.to_value("estado_codigo").unwrap_or(None),
                estado_nombre: row.to_value("estado_nombre").unwrap_or(None),
                titulo: row.to_value("titulo").unwrap_or(None),
                descripcion: row.to_value("descripcion").unwrap_or(None),
                fecha_incidente: row.to_value("fecha_incidente").unwrap_or(None),
                departamento: row.to_value("departamento").unwrap_or(None),
                provincia: row.to_value("provincia").unwrap_or(None),
                distrito: row.to_value("distrito").unwrap_or(None),
                referencia_lugar: row.to_value("referencia_lugar").unwrap_or(None),
                longitud: row.to_value("longitud").unwrap_or(None),
                latitud: row.to_value("latitud").unwrap_or(None),
                ubicacion_wkt: row.to_value("ubicacion_wkt").unwrap_or(None),
            });
        }

        Ok(incidents)
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.db.query_raw_params("SELECT 1 AS ok", &[]).await?;
        Ok(())
    }
}
