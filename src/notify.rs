//! Verdict notifications.
//!
//! The audit log is the record; notifications are for whoever is standing at
//! the gate. The default notifier writes to the log stream. The sound
//! notifier (feature `alert-sound`) additionally plays a configured clip.
//! Every failure in here is a warning, never an error: a broken speaker must
//! not block the gate.

use std::collections::BTreeSet;

use crate::detect::EquipmentClass;

pub trait Notifier {
    fn verdict_safe(&mut self);
    fn verdict_violation(&mut self, missing: &BTreeSet<EquipmentClass>);
}

/// Log-stream notifier. Always available.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn verdict_safe(&mut self) {
        log::info!("all required PPE worn, access granted");
    }

    fn verdict_violation(&mut self, missing: &BTreeSet<EquipmentClass>) {
        log::warn!("PPE violation confirmed, missing: {}", join_classes(missing));
    }
}

pub fn join_classes(classes: &BTreeSet<EquipmentClass>) -> String {
    classes
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "alert-sound")]
pub use sound::SoundNotifier;

#[cfg(feature = "alert-sound")]
mod sound {
    use super::{LogNotifier, Notifier};
    use crate::detect::EquipmentClass;
    use anyhow::{Context, Result};
    use std::collections::BTreeSet;
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};

    /// Plays a success or warning clip on top of the log notification.
    ///
    /// The output stream stays open for the notifier's lifetime; sinks are
    /// detached so playback does not stall the dispatch path.
    pub struct SoundNotifier {
        log: LogNotifier,
        success: Option<PathBuf>,
        warning: Option<PathBuf>,
        _stream: rodio::OutputStream,
        handle: rodio::OutputStreamHandle,
    }

    impl SoundNotifier {
        pub fn new(success: Option<PathBuf>, warning: Option<PathBuf>) -> Result<Self> {
            let (stream, handle) =
                rodio::OutputStream::try_default().context("opening audio output")?;
            Ok(Self {
                log: LogNotifier,
                success,
                warning,
                _stream: stream,
                handle,
            })
        }

        fn play(&self, path: &Path) {
            if let Err(err) = self.try_play(path) {
                log::warn!("sound playback failed for {}: {:?}", path.display(), err);
            }
        }

        fn try_play(&self, path: &Path) -> Result<()> {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let source = rodio::Decoder::new(BufReader::new(file))
                .with_context(|| format!("decoding {}", path.display()))?;
            let sink = rodio::Sink::try_new(&self.handle).context("creating audio sink")?;
            sink.append(source);
            sink.detach();
            Ok(())
        }
    }

    impl Notifier for SoundNotifier {
        fn verdict_safe(&mut self) {
            self.log.verdict_safe();
            if let Some(path) = self.success.clone() {
                self.play(&path);
            }
        }

        fn verdict_violation(&mut self, missing: &BTreeSet<EquipmentClass>) {
            self.log.verdict_violation(missing);
            if let Some(path) = self.warning.clone() {
                self.play(&path);
            }
        }
    }
}
