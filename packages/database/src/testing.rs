//! In-memory [`IncidentStore`] and [`FailureReporter`] doubles that record
//! everything they receive.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use cusco_reporta_database_models::{IncidentTables, PanelIncidentRow};

use crate::DbError;
use crate::report::{FailureKind, FailureReporter};
use crate::store::{IncidentStore, Statement};

/// A statement as seen by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatement {
    /// SQL text.
    pub sql: String,
    /// `Debug` rendering of each bound parameter.
    pub params: Vec<String>,
}

impl RecordedStatement {
    fn from_statement(statement: &Statement) -> Self {
        Self {
            sql: statement.sql.clone(),
            params: statement.params.iter().map(|p| format!("{p:?}")).collect(),
        }
    }

    /// Whether this statement inserts into `table`.
    #[must_use]
    pub fn inserts_into(&self, table: &str) -> bool {
        self.sql.starts_with("INSERT INTO") && self.sql.contains(&format!("\"{table}\""))
    }
}

/// Store double answering catalog lookups for the default
/// [`IncidentTables`] from fixed column sets.
pub struct RecordingStore {
    tables: IncidentTables,
    incident_columns: BTreeSet<String>,
    evidence_columns: BTreeSet<String>,
    rows: Vec<PanelIncidentRow>,
    fail_introspection: bool,
    fail_execute: bool,
    fail_insert: bool,
    fail_fetch: bool,
    fail_ping: bool,
    next_id: AtomicI64,
    statements: Mutex<Vec<RecordedStatement>>,
}

impl RecordingStore {
    /// Creates a store whose incident and evidence tables have the given
    /// columns.
    #[must_use]
    pub fn new(incident_columns: &[&str], evidence_columns: &[&str]) -> Self {
        Self {
            tables: IncidentTables::default(),
            incident_columns: incident_columns.iter().map(ToString::to_string).collect(),
            evidence_columns: evidence_columns.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
            fail_introspection: false,
            fail_execute: false,
            fail_insert: false,
            fail_fetch: false,
            fail_ping: false,
            next_id: AtomicI64::new(1),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Returns these rows from every read query.
    #[must_use]
    pub fn with_rows(mut self, rows: Vec<PanelIncidentRow>) -> Self {
        self.rows = rows;
        self
    }

    /// Makes every catalog lookup fail.
    #[must_use]
    pub fn failing_introspection(mut self) -> Self {
        self.fail_introspection = true;
        self
    }

    /// Makes every [`IncidentStore::execute`] call fail (used for evidence
    /// inserts).
    #[must_use]
    pub fn failing_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    /// Makes every [`IncidentStore::insert_returning_id`] call fail.
    #[must_use]
    pub fn failing_insert(mut self) -> Self {
        self.fail_insert = true;
        self
    }

    /// Makes every read query fail.
    #[must_use]
    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    /// Makes the connectivity probe fail.
    #[must_use]
    pub fn failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    /// Statements received so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the statement log mutex is poisoned.
    #[must_use]
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.statements.lock().unwrap().clone()
    }

    /// Number of statements that inserted into `table`.
    #[must_use]
    pub fn inserts_into(&self, table: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.inserts_into(table))
            .count()
    }

    fn record(&self, statement: &Statement) {
        self.statements
            .lock()
            .unwrap()
            .push(RecordedStatement::from_statement(statement));
    }
}

#[async_trait]
impl IncidentStore for RecordingStore {
    async fn table_columns(&self, _schema: &str, table: &str) -> Result<BTreeSet<String>, DbError> {
        if self.fail_introspection {
            return Err(DbError::Conversion {
                message: "catalog unavailable".to_string(),
            });
        }
        if table == self.tables.incidents {
            Ok(self.incident_columns.clone())
        } else if table == self.tables.evidence {
            Ok(self.evidence_columns.clone())
        } else {
            Ok(BTreeSet::new())
        }
    }

    async fn insert_returning_id(&self, statement: &Statement) -> Result<i64, DbError> {
        self.record(statement);
        if self.fail_insert {
            return Err(DbError::Conversion {
                message: "incident table is locked".to_string(),
            });
        }
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, DbError> {
        if self.fail_execute {
            return Err(DbError::Conversion {
                message: "evidence table is read-only".to_string(),
            });
        }
        self.record(statement);
        Ok(1)
    }

    async fn fetch_incidents(
        &self,
        statement: &Statement,
    ) -> Result<Vec<PanelIncidentRow>, DbError> {
        self.record(statement);
        if self.fail_fetch {
            return Err(DbError::Conversion {
                message: "panel view is unavailable".to_string(),
            });
        }
        Ok(self.rows.clone())
    }

    async fn ping(&self) -> Result<(), DbError> {
        if self.fail_ping {
            return Err(DbError::Conversion {
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

/// [`FailureReporter`] that keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(FailureKind, String)>>,
}

impl RecordingReporter {
    /// Reports received so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the report log mutex is poisoned.
    #[must_use]
    pub fn reports(&self) -> Vec<(FailureKind, String)> {
        self.reports.lock().unwrap().clone()
    }

    /// Kinds of the reports received so far, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<FailureKind> {
        self.reports().into_iter().map(|(kind, _)| kind).collect()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, kind: FailureKind, context: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((kind, context.to_string()));
    }
}
