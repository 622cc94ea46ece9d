//! Gate session orchestration.
//!
//! Glue between the per-frame evaluator, the temporal debouncer, and the
//! verdict dispatcher. One call per frame; at most one verdict per armed
//! cycle comes back out.

use anyhow::Result;

use crate::compliance::ComplianceEvaluator;
use crate::debounce::{Debouncer, DecisionState};
use crate::detect::Detection;
use crate::dispatch::VerdictDispatcher;
use crate::frame::GateFrame;
use crate::{Verdict, VerdictRecord};

/// Running counters, reported by the daemon's periodic status line.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub safe_verdicts: u64,
    pub violation_verdicts: u64,
    pub cycles_armed: u64,
}

pub struct GateSession {
    evaluator: ComplianceEvaluator,
    debouncer: Debouncer,
    dispatcher: VerdictDispatcher,
    stats: SessionStats,
}

impl GateSession {
    pub fn new(
        evaluator: ComplianceEvaluator,
        debouncer: Debouncer,
        dispatcher: VerdictDispatcher,
    ) -> Self {
        Self {
            evaluator,
            debouncer,
            dispatcher,
            stats: SessionStats::default(),
        }
    }

    /// Feed one frame and its detections through the pipeline. Returns the
    /// verdict record when this frame settles the current cycle, `None`
    /// while the cycle is still filling or already decided.
    pub fn process(
        &mut self,
        frame: GateFrame,
        detections: &[Detection],
    ) -> Result<Option<VerdictRecord>> {
        self.stats.frames_processed += 1;
        let observation = self.evaluator.evaluate(detections, frame);
        let Some(decision) = self.debouncer.observe(observation) else {
            return Ok(None);
        };
        let record = self.dispatcher.dispatch(&decision)?;
        match record.verdict {
            Verdict::Safe => self.stats.safe_verdicts += 1,
            Verdict::Violation => self.stats.violation_verdicts += 1,
        }
        Ok(Some(record))
    }

    /// Arm a fresh detection cycle. The next verdict needs a full new window.
    pub fn rearm(&mut self) {
        self.debouncer.reset();
        self.stats.cycles_armed += 1;
        log::info!("detection cycle re-armed");
    }

    pub fn is_decided(&self) -> bool {
        self.debouncer.state() == DecisionState::Decided
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Release the dispatcher's outputs (publisher queue included).
    pub fn shutdown(self) -> Result<()> {
        self.dispatcher.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ActuatorLink;
    use crate::compliance::RequiredEquipment;
    use crate::detect::{BoundingBox, EquipmentClass};
    use crate::notify::LogNotifier;

    fn detections(labels: &[&str]) -> Vec<Detection> {
        labels
            .iter()
            .map(|l| Detection::new(*l, 0.9, BoundingBox::from([0.0, 0.0, 64.0, 64.0])))
            .collect()
    }

    fn session_in(dir: &tempfile::TempDir, capacity: usize) -> GateSession {
        let required = RequiredEquipment::new(
            [
                EquipmentClass::Helmet,
                EquipmentClass::Gloves,
                EquipmentClass::Shoes,
            ]
            .into_iter()
            .collect(),
        )
        .unwrap();
        let dispatcher = VerdictDispatcher::new(
            dir.path().join("alerts"),
            dir.path().join("audit.csv"),
            Box::new(LogNotifier::default()),
            ActuatorLink::disabled(),
        )
        .unwrap();
        GateSession::new(
            ComplianceEvaluator::new(required.clone()),
            Debouncer::new(required, capacity).unwrap(),
            dispatcher,
        )
    }

    fn frame(seed: u64) -> GateFrame {
        GateFrame::synthetic(16, 12, seed)
    }

    #[test]
    fn safe_cycle_settles_once_the_window_fills() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, 3);
        let worn = detections(&["helmet", "gloves", "shoes"]);

        assert!(session.process(frame(0), &worn).unwrap().is_none());
        assert!(session.process(frame(1), &worn).unwrap().is_none());
        let record = session.process(frame(2), &worn).unwrap().expect("verdict");
        assert_eq!(record.verdict, Verdict::Safe);

        let stats = session.stats();
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.safe_verdicts, 1);
        assert_eq!(stats.violation_verdicts, 0);
    }

    #[test]
    fn decided_session_ignores_further_frames_until_rearmed() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, 2);
        let bare = detections(&[]);

        assert!(session.process(frame(0), &bare).unwrap().is_none());
        assert!(session.process(frame(1), &bare).unwrap().is_some());
        assert!(session.is_decided());

        // Latched: frames keep flowing but no second verdict fires.
        for seed in 2..6 {
            assert!(session.process(frame(seed), &bare).unwrap().is_none());
        }
        assert_eq!(session.stats().violation_verdicts, 1);

        session.rearm();
        assert!(!session.is_decided());
        assert!(session.process(frame(6), &bare).unwrap().is_none());
        let record = session.process(frame(7), &bare).unwrap().expect("verdict");
        assert_eq!(record.verdict, Verdict::Violation);
        assert_eq!(session.stats().violation_verdicts, 2);
        assert_eq!(session.stats().cycles_armed, 1);
    }

    #[test]
    fn violation_record_points_at_saved_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, 2);
        let partial = detections(&["helmet"]);

        session.process(frame(0), &partial).unwrap();
        let record = session
            .process(frame(1), &partial)
            .unwrap()
            .expect("verdict");
        assert_eq!(record.verdict, Verdict::Violation);
        let path = record.evidence_path.expect("evidence");
        assert!(path.starts_with(dir.path().join("alerts")));
        assert!(path.exists());
    }
}
