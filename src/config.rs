use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actuator::DEFAULT_ACTUATOR_BAUD;
use crate::compliance::RequiredEquipment;
use crate::debounce::DEFAULT_WINDOW_CAPACITY;
use crate::detect::EquipmentClass;
use crate::ingest::{SourceConfig, DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};
use crate::publish::{ApiSecret, PublisherConfig, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_QUEUE_DEPTH};

const DEFAULT_REQUIRED: &[&str] = &["helmet", "gloves", "shoes"];
const DEFAULT_ZONE: &str = "Zone A";
const DEFAULT_LOG_DIR: &str = "output/alerts";
const DEFAULT_AUDIT_PATH: &str = "output/final_alert_log.csv";
const DEFAULT_SOURCE_URI: &str = "stub://compliant";
const DEFAULT_SOURCE_FPS: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct SafegateConfigFile {
    window_capacity: Option<usize>,
    required: Option<Vec<String>>,
    zone: Option<String>,
    log_dir: Option<String>,
    audit_path: Option<String>,
    source: Option<SourceConfigFile>,
    actuator: Option<ActuatorConfigFile>,
    publisher: Option<PublisherConfigFile>,
    sounds: Option<SoundConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ActuatorConfigFile {
    port: Option<String>,
    baud: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PublisherConfigFile {
    upload_url: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    report_url: Option<String>,
    reported_by: Option<String>,
    queue_depth: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SoundConfigFile {
    success: Option<PathBuf>,
    warning: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SafegateConfig {
    pub window_capacity: usize,
    pub required: RequiredEquipment,
    pub zone: String,
    pub log_dir: PathBuf,
    pub audit_path: PathBuf,
    pub source: SourceSettings,
    pub actuator: ActuatorSettings,
    pub publisher: Option<PublisherSettings>,
    pub sounds: SoundSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub uri: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ActuatorSettings {
    pub port: Option<String>,
    pub baud: u32,
}

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub upload_url: String,
    pub api_key: String,
    pub api_secret: ApiSecret,
    pub report_url: String,
    pub reported_by: Option<String>,
    pub queue_depth: usize,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct SoundSettings {
    pub success: Option<PathBuf>,
    pub warning: Option<PathBuf>,
}

impl SafegateConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SAFEGATE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SafegateConfigFile) -> Result<Self> {
        let window_capacity = file.window_capacity.unwrap_or(DEFAULT_WINDOW_CAPACITY);
        let required = match file.required {
            Some(tokens) => parse_required(&tokens)?,
            None => {
                let defaults: Vec<String> =
                    DEFAULT_REQUIRED.iter().map(|s| s.to_string()).collect();
                parse_required(&defaults)?
            }
        };
        let zone = file.zone.unwrap_or_else(|| DEFAULT_ZONE.to_string());
        let log_dir = PathBuf::from(file.log_dir.unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()));
        let audit_path = PathBuf::from(
            file.audit_path
                .unwrap_or_else(|| DEFAULT_AUDIT_PATH.to_string()),
        );
        let source = SourceSettings {
            uri: file
                .source
                .as_ref()
                .and_then(|source| source.uri.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_FRAME_WIDTH),
            height: file
                .source
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_FRAME_HEIGHT),
        };
        let actuator = ActuatorSettings {
            port: file.actuator.as_ref().and_then(|a| a.port.clone()),
            baud: file
                .actuator
                .and_then(|a| a.baud)
                .unwrap_or(DEFAULT_ACTUATOR_BAUD),
        };
        let publisher = file.publisher.map(|p| PublisherSettings {
            upload_url: p.upload_url.unwrap_or_default(),
            api_key: p.api_key.unwrap_or_default(),
            api_secret: ApiSecret::new(p.api_secret.unwrap_or_default()),
            report_url: p.report_url.unwrap_or_default(),
            reported_by: p.reported_by,
            queue_depth: p.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
            timeout: Duration::from_secs(p.timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)),
        });
        let sounds = file
            .sounds
            .map(|s| SoundSettings {
                success: s.success,
                warning: s.warning,
            })
            .unwrap_or_default();
        Ok(Self {
            window_capacity,
            required,
            zone,
            log_dir,
            audit_path,
            source,
            actuator,
            publisher,
            sounds,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(capacity) = std::env::var("SAFEGATE_WINDOW") {
            self.window_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("SAFEGATE_WINDOW must be an integer frame count"))?;
        }
        if let Ok(required) = std::env::var("SAFEGATE_REQUIRED") {
            let tokens = split_csv(&required);
            if !tokens.is_empty() {
                self.required = parse_required(&tokens)?;
            }
        }
        if let Ok(zone) = std::env::var("SAFEGATE_ZONE") {
            if !zone.trim().is_empty() {
                self.zone = zone;
            }
        }
        if let Ok(dir) = std::env::var("SAFEGATE_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.log_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("SAFEGATE_AUDIT_LOG") {
            if !path.trim().is_empty() {
                self.audit_path = PathBuf::from(path);
            }
        }
        if let Ok(uri) = std::env::var("SAFEGATE_SOURCE") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(port) = std::env::var("SAFEGATE_ACTUATOR_PORT") {
            if !port.trim().is_empty() {
                self.actuator.port = Some(port);
            }
        }
        if let Some(publisher) = &mut self.publisher {
            if let Ok(key) = std::env::var("SAFEGATE_API_KEY") {
                if !key.trim().is_empty() {
                    publisher.api_key = key;
                }
            }
            if let Ok(secret) = std::env::var("SAFEGATE_API_SECRET") {
                if !secret.trim().is_empty() {
                    publisher.api_secret = ApiSecret::new(secret);
                }
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.window_capacity == 0 {
            return Err(anyhow!("window capacity must be greater than zero"));
        }
        if self.zone.trim().is_empty() {
            return Err(anyhow!("zone must not be empty"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source frame dimensions must be non-zero"));
        }
        if let Some(publisher) = &self.publisher {
            url::Url::parse(&publisher.upload_url)
                .map_err(|e| anyhow!("publisher upload_url is not a valid URL: {}", e))?;
            url::Url::parse(&publisher.report_url)
                .map_err(|e| anyhow!("publisher report_url is not a valid URL: {}", e))?;
            if publisher.api_key.trim().is_empty() {
                return Err(anyhow!("publisher api_key must be set (file or SAFEGATE_API_KEY)"));
            }
            if publisher.api_secret.is_empty() {
                return Err(anyhow!(
                    "publisher api_secret must be set (file or SAFEGATE_API_SECRET)"
                ));
            }
            if publisher.queue_depth == 0 {
                return Err(anyhow!("publisher queue_depth must be greater than zero"));
            }
        }
        Ok(())
    }

    /// Source settings in the shape the ingest layer consumes.
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            uri: self.source.uri.clone(),
            frame_width: self.source.width,
            frame_height: self.source.height,
        }
    }

    /// Publisher wiring, when one is configured.
    pub fn publisher_config(&self) -> Option<PublisherConfig> {
        self.publisher.as_ref().map(|p| PublisherConfig {
            upload_url: p.upload_url.clone(),
            api_key: p.api_key.clone(),
            api_secret: p.api_secret.clone(),
            report_url: p.report_url.clone(),
            zone: self.zone.clone(),
            reported_by: p.reported_by.clone(),
            timeout: p.timeout,
        })
    }
}

fn read_config_file(path: &Path) -> Result<SafegateConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_required(tokens: &[String]) -> Result<RequiredEquipment> {
    let mut classes = BTreeSet::new();
    for token in tokens {
        let class: EquipmentClass = token
            .parse()
            .map_err(|_| anyhow!("unknown equipment class '{}' in required list", token))?;
        classes.insert(class);
    }
    RequiredEquipment::new(classes)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
