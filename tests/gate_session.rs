use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use safegate::{
    ActuatorLink, BoundingBox, ComplianceEvaluator, Debouncer, Detection, EquipmentClass,
    EvidencePublisher, GateFrame, GateSession, Notifier, PublisherHandle, ReportJob,
    RequiredEquipment, SampleSource, SourceConfig, Verdict, VerdictDispatcher, AUDIT_HEADER,
};

// ==================== helpers ====================

#[derive(Clone, Default)]
struct RecordingNotifier {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Notifier for RecordingNotifier {
    fn verdict_safe(&mut self) {
        self.calls.lock().unwrap().push("safe".to_string());
    }

    fn verdict_violation(&mut self, missing: &BTreeSet<EquipmentClass>) {
        let labels: Vec<&str> = missing.iter().map(|c| c.label()).collect();
        self.calls
            .lock()
            .unwrap()
            .push(format!("violation:{}", labels.join("+")));
    }
}

fn detections(labels: &[&str]) -> Vec<Detection> {
    labels
        .iter()
        .map(|l| Detection::new(*l, 0.9, BoundingBox::from([0.0, 0.0, 50.0, 120.0])))
        .collect()
}

fn frame(seed: u64) -> GateFrame {
    GateFrame::synthetic(24, 16, seed)
}

fn required() -> RequiredEquipment {
    RequiredEquipment::new(
        [
            EquipmentClass::Helmet,
            EquipmentClass::Gloves,
            EquipmentClass::Shoes,
        ]
        .into_iter()
        .collect(),
    )
    .unwrap()
}

struct Harness {
    session: GateSession,
    calls: Arc<Mutex<Vec<String>>>,
    audit_path: PathBuf,
    alerts_dir: PathBuf,
}

fn harness(dir: &tempfile::TempDir, capacity: usize) -> Harness {
    let notifier = RecordingNotifier::default();
    let calls = notifier.calls.clone();
    let alerts_dir = dir.path().join("alerts");
    let audit_path = dir.path().join("final_alert_log.csv");
    let dispatcher = VerdictDispatcher::new(
        alerts_dir.clone(),
        &audit_path,
        Box::new(notifier),
        ActuatorLink::disabled(),
    )
    .unwrap();
    let session = GateSession::new(
        ComplianceEvaluator::new(required()),
        Debouncer::new(required(), capacity).unwrap(),
        dispatcher,
    );
    Harness {
        session,
        calls,
        audit_path,
        alerts_dir,
    }
}

fn audit_rows(path: &PathBuf) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

// ==================== full-window decisions ====================

#[test]
fn one_compliant_frame_in_a_full_window_clears_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, 7);
    let bad = detections(&["helmet"]);
    let good = detections(&["helmet", "gloves", "shoes"]);

    for seed in 0..6 {
        assert!(h.session.process(frame(seed), &bad).unwrap().is_none());
    }
    let record = h
        .session
        .process(frame(6), &good)
        .unwrap()
        .expect("verdict on the seventh frame");
    assert_eq!(record.verdict, Verdict::Safe);
    assert!(record.evidence_path.is_none());

    assert_eq!(h.calls.lock().unwrap().as_slice(), ["safe"]);
    assert!(fs::read_dir(&h.alerts_dir).unwrap().next().is_none());
    let rows = audit_rows(&h.audit_path);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], AUDIT_HEADER);
    assert!(rows[1].ends_with(",Safe,"));
}

#[test]
fn unanimous_bad_window_reports_the_oldest_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, 3);

    // Oldest frame is short gloves and shoes; later frames are short only
    // a helmet. The confirmed report must describe the oldest one.
    assert!(h
        .session
        .process(frame(0), &detections(&["helmet"]))
        .unwrap()
        .is_none());
    assert!(h
        .session
        .process(frame(1), &detections(&["gloves", "shoes"]))
        .unwrap()
        .is_none());
    let record = h
        .session
        .process(frame(2), &detections(&["gloves", "shoes"]))
        .unwrap()
        .expect("verdict");
    assert_eq!(record.verdict, Verdict::Violation);
    let evidence = record.evidence_path.expect("evidence saved");
    assert!(evidence.exists());

    assert_eq!(
        h.calls.lock().unwrap().as_slice(),
        ["violation:gloves+shoes"]
    );
    let rows = audit_rows(&h.audit_path);
    assert!(rows[1].contains(",Violation,"));
    assert!(rows[1].ends_with(".jpg"));
}

#[test]
fn no_verdict_before_the_window_fills() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, 5);
    for seed in 0..4 {
        assert!(h
            .session
            .process(frame(seed), &detections(&[]))
            .unwrap()
            .is_none());
    }
    // Header only; nothing decided yet.
    assert_eq!(audit_rows(&h.audit_path), [AUDIT_HEADER]);
}

// ==================== latch and re-arm ====================

#[test]
fn latched_cycle_writes_a_single_audit_row() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, 2);
    let bare = detections(&[]);
    let good = detections(&["helmet", "gloves", "shoes"]);

    h.session.process(frame(0), &bare).unwrap();
    assert!(h.session.process(frame(1), &bare).unwrap().is_some());

    // Even fully compliant frames cannot produce a second verdict while
    // the cycle stays latched.
    for seed in 2..8 {
        assert!(h.session.process(frame(seed), &good).unwrap().is_none());
    }
    assert_eq!(audit_rows(&h.audit_path).len(), 2);

    h.session.rearm();
    h.session.process(frame(8), &good).unwrap();
    let record = h.session.process(frame(9), &good).unwrap().expect("verdict");
    assert_eq!(record.verdict, Verdict::Safe);

    assert_eq!(audit_rows(&h.audit_path).len(), 3);
    assert_eq!(
        h.calls.lock().unwrap().as_slice(),
        ["violation:helmet+gloves+shoes", "safe"]
    );
}

#[test]
fn each_cycle_reports_its_own_missing_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, 2);

    h.session
        .process(frame(0), &detections(&["helmet"]))
        .unwrap();
    h.session
        .process(frame(1), &detections(&["helmet"]))
        .unwrap();

    h.session.rearm();
    h.session
        .process(frame(2), &detections(&["gloves", "shoes"]))
        .unwrap();
    h.session
        .process(frame(3), &detections(&["gloves", "shoes"]))
        .unwrap();

    assert_eq!(
        h.calls.lock().unwrap().as_slice(),
        ["violation:gloves+shoes", "violation:helmet"]
    );
    assert_eq!(audit_rows(&h.audit_path).len(), 3);
}

#[test]
fn audit_rows_match_completed_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, 1);
    let good = detections(&["helmet", "gloves", "shoes"]);
    let bare = detections(&[]);

    for cycle in 0..5u64 {
        let labels = if cycle % 2 == 0 { &good } else { &bare };
        let record = h.session.process(frame(cycle), labels).unwrap();
        assert!(record.is_some());
        h.session.rearm();
    }

    let rows = audit_rows(&h.audit_path);
    assert_eq!(rows.len(), 6);
    let stats = h.session.stats();
    assert_eq!(stats.safe_verdicts, 3);
    assert_eq!(stats.violation_verdicts, 2);
}

// ==================== source-driven pipelines ====================

#[test]
fn violation_stub_drives_a_full_pipeline_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(&dir, 4);
    let mut source = SampleSource::new(SourceConfig {
        uri: "stub://violation".to_string(),
        frame_width: 32,
        frame_height: 24,
    })
    .unwrap();
    source.connect().unwrap();

    let mut verdict = None;
    for _ in 0..8 {
        let sample = source.next_sample().unwrap().unwrap();
        if let Some(record) = h
            .session
            .process(sample.frame, &sample.detections)
            .unwrap()
        {
            verdict = Some(record);
            break;
        }
    }
    let record = verdict.expect("stub scene confirms within two windows");
    assert_eq!(record.verdict, Verdict::Violation);
    assert_eq!(
        h.calls.lock().unwrap().as_slice(),
        ["violation:gloves+shoes"]
    );
}

#[test]
fn jsonl_replay_reaches_a_safe_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let replay = dir.path().join("run.jsonl");
    let mut file = fs::File::create(&replay).unwrap();
    writeln!(
        file,
        r#"{{"detections":[{{"label":"helmet","confidence":0.8,"bbox":[0,0,40,90]}}]}}"#
    )
    .unwrap();
    writeln!(file, "detector hiccup, not json").unwrap();
    writeln!(
        file,
        r#"{{"detections":[{{"label":"helmet","confidence":0.8,"bbox":[0,0,40,90]}}]}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"detections":[{{"label":"helmet","confidence":0.9,"bbox":[0,0,40,90]}},{{"label":"gloves","confidence":0.9,"bbox":[40,0,80,90]}},{{"label":"shoes","confidence":0.9,"bbox":[80,0,120,90]}}]}}"#
    )
    .unwrap();
    drop(file);

    let mut h = harness(&dir, 3);
    let mut source = SampleSource::new(SourceConfig {
        uri: replay.to_str().unwrap().to_string(),
        frame_width: 32,
        frame_height: 24,
    })
    .unwrap();
    source.connect().unwrap();

    let mut verdict = None;
    while let Some(sample) = source.next_sample().unwrap() {
        if let Some(record) = h
            .session
            .process(sample.frame, &sample.detections)
            .unwrap()
        {
            verdict = Some(record);
        }
    }
    assert_eq!(verdict.expect("replay settles").verdict, Verdict::Safe);
    assert_eq!(source.stats().lines_skipped, 1);
    assert_eq!(source.stats().samples_produced, 3);
}

// ==================== publisher isolation ====================

struct FailingPublisher;

impl EvidencePublisher for FailingPublisher {
    fn publish(&self, _job: &ReportJob) -> anyhow::Result<String> {
        Err(anyhow!("report endpoint unreachable"))
    }
}

#[test]
fn dead_publisher_does_not_stall_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let publisher = PublisherHandle::spawn(Box::new(FailingPublisher), 4).unwrap();
    let dispatcher = VerdictDispatcher::new(
        dir.path().join("alerts"),
        dir.path().join("audit.csv"),
        Box::new(notifier),
        ActuatorLink::disabled(),
    )
    .unwrap()
    .with_publisher(publisher);
    let mut session = GateSession::new(
        ComplianceEvaluator::new(required()),
        Debouncer::new(required(), 2).unwrap(),
        dispatcher,
    );

    session.process(frame(0), &detections(&[])).unwrap();
    let record = session
        .process(frame(1), &detections(&[]))
        .unwrap()
        .expect("verdict");
    assert_eq!(record.verdict, Verdict::Violation);
    assert!(record.evidence_path.unwrap().exists());
    session.shutdown().unwrap();
}
