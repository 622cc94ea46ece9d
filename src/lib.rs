//! SafeGate temporal compliance engine.
//!
//! This crate turns per-frame PPE detections into debounced gate verdicts.
//!
//! # Architecture
//!
//! Each frame flows through three stages:
//!
//! 1. **Evaluate**: raw detection labels are filtered against the known
//!    equipment classes and checked against the required set for this gate.
//! 2. **Debounce**: observations accumulate in a fixed window. A single
//!    compliant frame anywhere in a full window clears the cycle; only a
//!    unanimous window of non-compliant frames confirms a violation, with
//!    the oldest frame kept as evidence.
//! 3. **Dispatch**: a confirmed verdict is carried out exactly once per
//!    cycle: evidence JPEG, operator notification, gate signal, audit row,
//!    and the report hand-off to the publisher queue.
//!
//! # Module Structure
//!
//! - `detect`: detection records and the equipment class list
//! - `frame`: RGB frame buffer and JPEG evidence writing
//! - `compliance`: required-set policy and per-frame evaluation
//! - `debounce`: observation window and final decisions
//! - `dispatch`, `audit`, `notify`, `actuator`, `publish`: verdict outputs
//! - `ingest`: synthetic and JSONL replay sample sources
//! - `session`: per-gate orchestration
//! - `config`: file plus environment configuration

use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;

pub mod actuator;
pub mod audit;
pub mod compliance;
pub mod config;
pub mod debounce;
pub mod detect;
pub mod dispatch;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod publish;
pub mod session;

pub use actuator::{ActuatorLink, GateSignal, DEFAULT_ACTUATOR_BAUD};
pub use audit::{AuditLog, AUDIT_HEADER};
pub use compliance::{ComplianceEvaluator, FrameObservation, RequiredEquipment};
pub use config::SafegateConfig;
pub use debounce::{
    Debouncer, Decision, DecisionState, ObservationWindow, ViolationEvidence,
    DEFAULT_WINDOW_CAPACITY,
};
pub use detect::{BoundingBox, Detection, EquipmentClass};
pub use dispatch::VerdictDispatcher;
pub use frame::GateFrame;
pub use ingest::{FrameSample, SampleSource, SourceConfig, StubScenario};
pub use notify::{LogNotifier, Notifier};
#[cfg(feature = "alert-sound")]
pub use notify::SoundNotifier;
pub use publish::{
    ApiSecret, EvidencePublisher, HttpPublisher, PublisherConfig, PublisherHandle, ReportJob,
};
pub use session::{GateSession, SessionStats};

// -------------------- Verdicts --------------------

/// Final outcome of one detection cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    Safe,
    Violation,
}

impl Verdict {
    /// Label written to the audit log's Result column.
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Safe => "Safe",
            Verdict::Violation => "Violation",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One confirmed verdict with its audit trail coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct VerdictRecord {
    /// Wall-clock time the verdict was dispatched.
    pub at: DateTime<Local>,
    pub verdict: Verdict,
    /// Saved evidence frame; present for violations only.
    pub evidence_path: Option<PathBuf>,
}

impl VerdictRecord {
    pub fn safe(at: DateTime<Local>) -> Self {
        Self {
            at,
            verdict: Verdict::Safe,
            evidence_path: None,
        }
    }

    pub fn violation(at: DateTime<Local>, evidence_path: PathBuf) -> Self {
        Self {
            at,
            verdict: Verdict::Violation,
            evidence_path: Some(evidence_path),
        }
    }
}
