//! Failure reporting for the incident write and read paths.
//!
//! The core reports every non-success outcome through a [`FailureReporter`]
//! with a kind and a context string. How those reports reach operators is
//! up to the implementation; [`LogReporter`] sends them to the `log` facade.

use std::fmt;

/// Category of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The submission was rejected before touching the store.
    Validation,
    /// A store operation failed and the request was aborted.
    Store,
    /// The incident was saved but the evidence table offered no compatible
    /// columns.
    EvidenceSkipped,
    /// The incident was saved but writing the evidence row failed.
    EvidenceFailed,
}

impl FailureKind {
    /// Whether the incident itself was persisted despite this failure.
    #[must_use]
    pub const fn is_partial_write(self) -> bool {
        matches!(self, Self::EvidenceSkipped | Self::EvidenceFailed)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Store => "store",
            Self::EvidenceSkipped => "evidence_skipped",
            Self::EvidenceFailed => "evidence_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives failure reports from the incident core.
pub trait FailureReporter: Send + Sync {
    /// Records one failure.
    fn report(&self, kind: FailureKind, context: &str);
}

/// [`FailureReporter`] that writes to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn report(&self, kind: FailureKind, context: &str) {
        if kind == FailureKind::Store {
            log::error!("[{kind}] {context}");
        } else if kind.is_partial_write() {
            log::warn!("[{kind}] incident kept: {context}");
        } else {
            log::warn!("[{kind}] {context}");
        }
    }
}
