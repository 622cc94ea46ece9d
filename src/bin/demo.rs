//! demo - end-to-end synthetic run for the SafeGate engine

use anyhow::{anyhow, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use safegate::{
    ActuatorLink, ComplianceEvaluator, Debouncer, EquipmentClass, GateSession, LogNotifier,
    RequiredEquipment, SampleSource, SourceConfig, Verdict, VerdictDispatcher, VerdictRecord,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Output directory for evidence frames and the audit log.
    #[arg(long, default_value = "demo_out")]
    out: String,
    /// Observation window size in frames.
    #[arg(long, default_value_t = safegate::DEFAULT_WINDOW_CAPACITY)]
    window: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.window == 0 {
        return Err(anyhow!("window must be >= 1"));
    }

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)?;
    let alerts_dir = out_dir.join("alerts");
    let audit_path = out_dir.join("final_alert_log.csv");

    stage("build engine");
    let required = RequiredEquipment::new(
        [
            EquipmentClass::Helmet,
            EquipmentClass::Gloves,
            EquipmentClass::Shoes,
        ]
        .into_iter()
        .collect(),
    )?;
    let dispatcher = VerdictDispatcher::new(
        alerts_dir,
        &audit_path,
        Box::new(LogNotifier),
        ActuatorLink::disabled(),
    )?;
    let mut session = GateSession::new(
        ComplianceEvaluator::new(required.clone()),
        Debouncer::new(required, args.window)?,
        dispatcher,
    );

    // Enough frames for any scripted scene to fill the window.
    let frames_per_phase = args.window * 4;

    stage("phase 1: compliant crew at the gate");
    let record = run_phase(&mut session, "stub://compliant", frames_per_phase)?
        .ok_or_else(|| anyhow!("compliant phase produced no verdict"))?;
    if record.verdict != Verdict::Safe {
        return Err(anyhow!("expected a safe verdict, got {}", record.verdict));
    }

    stage("phase 2: crew missing gloves and shoes");
    session.rearm();
    let record = run_phase(&mut session, "stub://violation", frames_per_phase)?
        .ok_or_else(|| anyhow!("violation phase produced no verdict"))?;
    if record.verdict != Verdict::Violation {
        return Err(anyhow!("expected a violation verdict, got {}", record.verdict));
    }
    let evidence = record
        .evidence_path
        .ok_or_else(|| anyhow!("violation verdict without an evidence frame"))?;

    stage("phase 3: flaky detector, occasional clean frames");
    session.rearm();
    let flaky = run_phase(&mut session, "stub://flaky", frames_per_phase)?
        .ok_or_else(|| anyhow!("flaky phase produced no verdict"))?;

    let stats = session.stats();
    let audit = fs::read_to_string(&audit_path)?;

    println!("demo summary:");
    println!("  frames processed: {}", stats.frames_processed);
    println!("  safe verdicts: {}", stats.safe_verdicts);
    println!("  violation verdicts: {}", stats.violation_verdicts);
    println!("  flaky phase verdict: {}", flaky.verdict);
    println!("  evidence frame: {}", evidence.display());
    println!("  audit log: {}", audit_path.display());
    println!(
        "  audit rows: {}",
        audit.lines().count().saturating_sub(1)
    );
    println!("next steps:");
    println!("  cat {}", audit_path.display());
    println!("  cargo run --bin safegated -- --rearm-secs 30");

    session.shutdown()?;
    Ok(())
}

fn run_phase(
    session: &mut GateSession,
    uri: &str,
    frames_per_phase: usize,
) -> Result<Option<VerdictRecord>> {
    let mut source = SampleSource::new(SourceConfig {
        uri: uri.to_string(),
        frame_width: 320,
        frame_height: 240,
    })?;
    source.connect()?;
    for _ in 0..frames_per_phase {
        let Some(sample) = source.next_sample()? else {
            break;
        };
        if let Some(record) = session.process(sample.frame, &sample.detections)? {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
