//! Detection sample sources.
//!
//! A `SampleSource` feeds the engine loop with (frame, detections) pairs.
//! Two backends: a synthetic generator behind the `stub://` scheme for demos
//! and tests, and JSONL replay of recorded detector output for offline runs.
//! Replay records carry no pixels; replay frames are synthesized at the
//! recorded dimensions when the record names them, else at the configured
//! ones.

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::str::FromStr;

use crate::detect::{BoundingBox, Detection};
use crate::frame::GateFrame;

pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;

/// Configuration for a sample source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://<scenario>` or a local JSONL replay path.
    pub uri: String,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://compliant".to_string(),
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
        }
    }
}

/// One unit of work for the engine loop.
#[derive(Clone, Debug)]
pub struct FrameSample {
    pub frame: GateFrame,
    pub detections: Vec<Detection>,
}

/// Detection sample source.
pub struct SampleSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    Jsonl(JsonlSource),
}

impl SampleSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if let Some(scenario) = config.uri.strip_prefix("stub://") {
            let scenario = scenario.parse()?;
            Ok(Self {
                backend: SourceBackend::Synthetic(SyntheticSource::new(scenario, config)),
            })
        } else if config.uri.contains("://") {
            Err(anyhow!(
                "sample sources are local only (stub://<scenario> or a JSONL path)"
            ))
        } else {
            Ok(Self {
                backend: SourceBackend::Jsonl(JsonlSource::new(config)),
            })
        }
    }

    /// Connect to the source.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.connect(),
            SourceBackend::Jsonl(source) => source.connect(),
        }
    }

    /// Produce the next sample. `None` once a replay file is exhausted;
    /// synthetic sources never run dry.
    pub fn next_sample(&mut self) -> Result<Option<FrameSample>> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_sample(),
            SourceBackend::Jsonl(source) => source.next_sample(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            SourceBackend::Synthetic(_) => true,
            SourceBackend::Jsonl(source) => source.is_healthy(),
        }
    }

    /// Get source statistics.
    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            SourceBackend::Jsonl(source) => source.stats(),
        }
    }
}

/// Statistics for a sample source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub samples_produced: u64,
    pub lines_skipped: u64,
    pub uri: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for demos and tests
// ----------------------------------------------------------------------------

/// Scripted scene behind `stub://`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StubScenario {
    /// Full required kit in every frame.
    Compliant,
    /// Helmet only; gloves and shoes stay missing.
    Violation,
    /// Short one item most frames; every third sample is fully compliant.
    Flaky,
}

impl FromStr for StubScenario {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compliant" => Ok(Self::Compliant),
            "violation" => Ok(Self::Violation),
            "flaky" => Ok(Self::Flaky),
            other => Err(anyhow!(
                "unknown stub scenario '{}' (expected compliant, violation, or flaky)",
                other
            )),
        }
    }
}

struct SyntheticSource {
    scenario: StubScenario,
    config: SourceConfig,
    sample_count: u64,
}

impl SyntheticSource {
    fn new(scenario: StubScenario, config: SourceConfig) -> Self {
        Self {
            scenario,
            config,
            sample_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SampleSource: connected to {} (synthetic, {:?})",
            self.config.uri,
            self.scenario
        );
        Ok(())
    }

    fn next_sample(&mut self) -> Result<Option<FrameSample>> {
        self.sample_count += 1;
        let labels: &[&str] = match self.scenario {
            StubScenario::Compliant => &["helmet", "gloves", "shoes"],
            StubScenario::Violation => &["helmet"],
            StubScenario::Flaky if self.sample_count % 3 == 0 => {
                &["helmet", "gloves", "shoes"]
            }
            StubScenario::Flaky => &["helmet", "gloves"],
        };
        let detections = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let confidence = rand::thread_rng().gen_range(0.70..0.99);
                let left = 40.0 * i as f32;
                Detection::new(
                    *label,
                    confidence,
                    BoundingBox::from([left, 0.0, left + 36.0, 90.0]),
                )
            })
            .collect();
        let frame = GateFrame::synthetic(
            self.config.frame_width,
            self.config.frame_height,
            self.sample_count,
        );
        Ok(Some(FrameSample { frame, detections }))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            samples_produced: self.sample_count,
            lines_skipped: 0,
            uri: self.config.uri.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// JSONL replay source
// ----------------------------------------------------------------------------

/// One recorded detector output line.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    #[serde(default)]
    detections: Vec<Detection>,
    frame: Option<ReplayFrameMeta>,
}

/// Recorded frame dimensions, when the capture wrote them.
#[derive(Debug, Deserialize)]
struct ReplayFrameMeta {
    width: u32,
    height: u32,
}

struct JsonlSource {
    config: SourceConfig,
    lines: Option<Lines<BufReader<File>>>,
    line_no: u64,
    samples: u64,
    skipped: u64,
}

impl JsonlSource {
    fn new(config: SourceConfig) -> Self {
        Self {
            config,
            lines: None,
            line_no: 0,
            samples: 0,
            skipped: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        let file = File::open(&self.config.uri)
            .with_context(|| format!("opening replay file {}", self.config.uri))?;
        self.lines = Some(BufReader::new(file).lines());
        log::info!("SampleSource: replaying {}", self.config.uri);
        Ok(())
    }

    fn next_sample(&mut self) -> Result<Option<FrameSample>> {
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| anyhow!("replay source not connected"))?;
        loop {
            let Some(line) = lines.next() else {
                return Ok(None);
            };
            let line = line.context("reading replay line")?;
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ReplayRecord>(trimmed) {
                Ok(record) => {
                    self.samples += 1;
                    let (width, height) = match &record.frame {
                        Some(meta) => (meta.width, meta.height),
                        None => (self.config.frame_width, self.config.frame_height),
                    };
                    let frame = GateFrame::synthetic(width, height, self.samples);
                    return Ok(Some(FrameSample {
                        frame,
                        detections: record.detections,
                    }));
                }
                Err(err) => {
                    self.skipped += 1;
                    log::warn!("replay line {} unparseable, skipped: {}", self.line_no, err);
                }
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.lines.is_some()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            samples_produced: self.samples,
            lines_skipped: self.skipped,
            uri: self.config.uri.clone(),
        }
    }
}
