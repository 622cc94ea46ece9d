//! safegated - SafeGate compliance daemon
//!
//! This daemon:
//! 1. Pulls detection samples from the configured source
//! 2. Evaluates each frame against the required equipment set
//! 3. Debounces observations into at most one verdict per cycle
//! 4. Dispatches verdicts (evidence frame, audit row, gate signal, report)
//! 5. Re-arms after a verdict when --rearm-secs is set, otherwise exits

use anyhow::Result;
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use safegate::{
    ActuatorLink, ComplianceEvaluator, Debouncer, GateSession, HttpPublisher, LogNotifier,
    Notifier, PublisherHandle, SafegateConfig, SampleSource, VerdictDispatcher,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Debounced PPE compliance verdicts for gate control"
)]
struct Args {
    /// Seconds to wait after a verdict before arming the next cycle.
    /// Without this flag the daemon decides once and exits.
    #[arg(long, env = "SAFEGATE_REARM_SECS")]
    rearm_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = SafegateConfig::load()?;

    log::info!(
        "safegated starting: zone='{}' window={} required=[{}]",
        config.zone,
        config.window_capacity,
        config.required
    );

    let mut source = SampleSource::new(config.source_config())?;
    source.connect()?;

    let notifier = build_notifier(&config);
    let actuator = ActuatorLink::open(config.actuator.port.as_deref(), config.actuator.baud);
    if !actuator.is_enabled() {
        log::info!("gate actuator disabled, verdicts will only be logged");
    }

    let mut dispatcher = VerdictDispatcher::new(
        config.log_dir.clone(),
        &config.audit_path,
        notifier,
        actuator,
    )?;
    if let (Some(publisher_cfg), Some(settings)) =
        (config.publisher_config(), config.publisher.as_ref())
    {
        let handle = PublisherHandle::spawn(
            Box::new(HttpPublisher::new(publisher_cfg)),
            settings.queue_depth,
        )?;
        dispatcher = dispatcher.with_publisher(handle);
        log::info!("evidence publisher enabled -> {}", settings.report_url);
    }

    let mut session = GateSession::new(
        ComplianceEvaluator::new(config.required.clone()),
        Debouncer::new(config.required.clone(), config.window_capacity)?,
        dispatcher,
    );

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let frame_interval = Duration::from_millis((1000 / config.source.target_fps as u64).max(1));
    let mut last_health_log = Instant::now();
    let mut rearm_at: Option<Instant> = None;

    log::info!(
        "safegated running. audit log at {}",
        config.audit_path.display()
    );

    while running.load(Ordering::SeqCst) {
        if let Some(when) = rearm_at {
            if Instant::now() >= when {
                session.rearm();
                rearm_at = None;
            }
        }

        // Frames keep flowing while a decided cycle waits for re-arm; the
        // debouncer discards them without issuing a second verdict.
        let Some(sample) = source.next_sample()? else {
            log::info!("sample source exhausted");
            break;
        };

        if let Some(record) = session.process(sample.frame, &sample.detections)? {
            let stats = session.stats();
            log::info!(
                "verdict: {} (safe={} violations={})",
                record.verdict,
                stats.safe_verdicts,
                stats.violation_verdicts
            );
            match args.rearm_secs {
                Some(secs) => rearm_at = Some(Instant::now() + Duration::from_secs(secs)),
                None => break,
            }
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = session.stats();
            let source_stats = source.stats();
            log::info!(
                "health: source_ok={} frames={} skipped_lines={} uri={}",
                source.is_healthy(),
                stats.frames_processed,
                source_stats.lines_skipped,
                source_stats.uri
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(frame_interval);
    }

    let stats = session.stats();
    log::info!(
        "safegated stopping: frames={} safe={} violations={}",
        stats.frames_processed,
        stats.safe_verdicts,
        stats.violation_verdicts
    );
    session.shutdown()?;
    Ok(())
}

fn build_notifier(config: &SafegateConfig) -> Box<dyn Notifier> {
    let wants_sound = config.sounds.success.is_some() || config.sounds.warning.is_some();
    #[cfg(feature = "alert-sound")]
    {
        if wants_sound {
            match safegate::SoundNotifier::new(
                config.sounds.success.clone(),
                config.sounds.warning.clone(),
            ) {
                Ok(notifier) => return Box::new(notifier),
                Err(err) => {
                    log::warn!("sound output unavailable, logging only: {:?}", err);
                }
            }
        }
    }
    #[cfg(not(feature = "alert-sound"))]
    {
        if wants_sound {
            log::warn!("sound paths configured but safegated was built without alert-sound");
        }
    }
    Box::new(LogNotifier)
}
