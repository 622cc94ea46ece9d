//! Verdict dispatch.
//!
//! Once the debouncer confirms a decision, the dispatcher carries it out:
//! persist the evidence frame, notify the operator, signal the gate, append
//! the audit row, and hand the report to the publisher queue. Evidence and
//! audit writes are load-bearing and propagate errors; collaborator failures
//! (actuator, publisher) are logged and absorbed so one dead peripheral
//! cannot take the engine down.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

use crate::actuator::{ActuatorLink, GateSignal};
use crate::audit::AuditLog;
use crate::debounce::Decision;
use crate::frame::GateFrame;
use crate::notify::Notifier;
use crate::publish::{PublisherHandle, ReportJob};
use crate::VerdictRecord;

/// Filename pattern for persisted evidence frames.
const EVIDENCE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

pub struct VerdictDispatcher {
    log_dir: PathBuf,
    audit: AuditLog,
    notifier: Box<dyn Notifier>,
    actuator: ActuatorLink,
    publisher: Option<PublisherHandle>,
}

impl VerdictDispatcher {
    /// Wire up the outputs. Creates the evidence directory and opens the
    /// audit log; failure of either is fatal.
    pub fn new(
        log_dir: impl Into<PathBuf>,
        audit_path: impl AsRef<Path>,
        notifier: Box<dyn Notifier>,
        actuator: ActuatorLink,
    ) -> Result<Self> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating evidence directory {}", log_dir.display()))?;
        let audit = AuditLog::open(audit_path.as_ref())?;
        Ok(Self {
            log_dir,
            audit,
            notifier,
            actuator,
            publisher: None,
        })
    }

    pub fn with_publisher(mut self, publisher: PublisherHandle) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Carry out one confirmed decision and return the audit record written
    /// for it. The timestamp is captured once so the evidence filename and
    /// the audit row always agree.
    pub fn dispatch(&mut self, decision: &Decision) -> Result<VerdictRecord> {
        let at = Local::now();
        let mut report = None;
        let record = match decision {
            Decision::FinalSafe => {
                self.notifier.verdict_safe();
                self.actuator.signal(GateSignal::Safe);
                VerdictRecord::safe(at)
            }
            Decision::FinalViolation(evidence) => {
                let path = self.save_evidence(&evidence.frame, at)?;
                self.notifier.verdict_violation(&evidence.missing);
                self.actuator.signal(GateSignal::Violation);
                report = Some(ReportJob {
                    missing: evidence.missing.clone(),
                    evidence_path: path.clone(),
                });
                VerdictRecord::violation(at, path)
            }
        };
        self.audit.append(&record)?;
        if let (Some(publisher), Some(job)) = (&self.publisher, report) {
            publisher.try_submit(job);
        }
        Ok(record)
    }

    fn save_evidence(&self, frame: &GateFrame, at: DateTime<Local>) -> Result<PathBuf> {
        let filename = format!("violation_{}.jpg", at.format(EVIDENCE_TIME_FORMAT));
        let path = self.log_dir.join(filename);
        frame.save_jpeg(&path)?;
        log::info!("evidence frame saved to {}", path.display());
        Ok(path)
    }

    /// Flush the publisher queue and join its worker. Call on the way out;
    /// dropping the dispatcher without it abandons queued reports.
    pub fn shutdown(self) -> Result<()> {
        if let Some(publisher) = self.publisher {
            publisher.stop()?;
        }
        Ok(())
    }
}
