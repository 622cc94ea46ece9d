//! Evidence publishing.
//!
//! Two outbound calls per confirmed violation: a signed multipart upload of
//! the evidence JPEG to the content store, then a JSON report to the
//! dashboard. Both run on a dedicated worker thread fed through a bounded
//! queue, so a slow or dead remote never stalls frame ingestion. Delivery is
//! at-most-once; a saturated queue drops the report with a warning.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::detect::EquipmentClass;

pub const DEFAULT_QUEUE_DEPTH: usize = 16;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Shared signing secret. Wiped from memory on drop, redacted in Debug.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiSecret(String);

impl ApiSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiSecret(..)")
    }
}

/// Settings for the HTTP publisher.
#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub upload_url: String,
    pub api_key: String,
    pub api_secret: ApiSecret,
    pub report_url: String,
    pub zone: String,
    pub reported_by: Option<String>,
    pub timeout: Duration,
}

/// One queued violation report.
#[derive(Clone, Debug)]
pub struct ReportJob {
    pub missing: BTreeSet<EquipmentClass>,
    pub evidence_path: PathBuf,
}

/// Delivery target for confirmed violations. The worker thread only ever
/// sees this trait.
pub trait EvidencePublisher: Send {
    /// Upload evidence and deliver the report. Returns the public snapshot
    /// URL on success.
    fn publish(&self, job: &ReportJob) -> Result<String>;
}

// ----------------------------------------------------------------------------
// Request signing
// ----------------------------------------------------------------------------

/// Keyed-hash request signature: non-empty params sorted by key, joined as
/// `k=v` pairs with `&`, secret appended, digest hex-encoded.
pub fn sign_params(params: &[(&str, String)], secret: &ApiSecret) -> String {
    let mut kept: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    kept.sort_by_key(|(k, _)| *k);
    let joined = kept
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let digest = Sha256::digest(format!("{}{}", joined, secret.expose()).as_bytes());
    hex::encode(digest)
}

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ViolationReport {
    zone: String,
    #[serde(rename = "ppeMissing")]
    ppe_missing: Vec<String>,
    #[serde(rename = "snapshotUrl")]
    snapshot_url: String,
    #[serde(rename = "reportedBy", skip_serializing_if = "Option::is_none")]
    reported_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

// ----------------------------------------------------------------------------
// HTTP publisher
// ----------------------------------------------------------------------------

/// Real publisher: signed multipart upload, then the report POST.
pub struct HttpPublisher {
    cfg: PublisherConfig,
    agent: ureq::Agent,
}

impl HttpPublisher {
    pub fn new(cfg: PublisherConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(cfg.timeout).build();
        Self { cfg, agent }
    }

    fn upload_evidence(&self, path: &Path) -> Result<String> {
        let image = std::fs::read(path)
            .with_context(|| format!("reading evidence file {}", path.display()))?;
        let timestamp = unix_now().to_string();
        let public_id = format!("ppe_snapshot_{}", timestamp);
        let signature = sign_params(
            &[
                ("timestamp", timestamp.clone()),
                ("public_id", public_id.clone()),
            ],
            &self.cfg.api_secret,
        );

        let mut form = MultipartForm::new();
        form.text("timestamp", &timestamp);
        form.text("public_id", &public_id);
        form.text("api_key", &self.cfg.api_key);
        form.text("signature", &signature);
        form.file("file", "evidence.jpg", "image/jpeg", &image);
        let (content_type, body) = form.finish();

        let response = self
            .agent
            .post(&self.cfg.upload_url)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .context("uploading evidence image")?;
        let parsed: UploadResponse = response
            .into_json()
            .context("parsing upload response")?;
        parsed
            .secure_url
            .ok_or_else(|| anyhow!("upload response carried no secure_url"))
    }

    fn post_report(&self, job: &ReportJob, snapshot_url: String) -> Result<()> {
        let report = ViolationReport {
            zone: self.cfg.zone.clone(),
            ppe_missing: job.missing.iter().map(|c| c.label().to_string()).collect(),
            snapshot_url,
            reported_by: self.cfg.reported_by.clone(),
        };
        self.agent
            .post(&self.cfg.report_url)
            .send_json(&report)
            .context("posting violation report")?;
        Ok(())
    }
}

impl EvidencePublisher for HttpPublisher {
    fn publish(&self, job: &ReportJob) -> Result<String> {
        let snapshot_url = self.upload_evidence(&job.evidence_path)?;
        self.post_report(job, snapshot_url.clone())?;
        log::info!("violation report delivered for zone '{}'", self.cfg.zone);
        Ok(snapshot_url)
    }
}

// ----------------------------------------------------------------------------
// Multipart body
// ----------------------------------------------------------------------------

/// Minimal multipart/form-data writer for the upload request.
struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    fn new() -> Self {
        Self {
            boundary: format!("safegate-{:016x}", rand::random::<u64>()),
            body: Vec::new(),
        }
    }

    fn text(&mut self, name: &str, value: &str) {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
    }

    fn file(&mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, filename, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
    }

    fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ----------------------------------------------------------------------------
// Background worker
// ----------------------------------------------------------------------------

/// Handle to the publisher worker thread. Submissions never block; `stop`
/// drains the queue and joins the thread.
pub struct PublisherHandle {
    tx: SyncSender<ReportJob>,
    join: Option<JoinHandle<()>>,
}

impl PublisherHandle {
    pub fn spawn(publisher: Box<dyn EvidencePublisher>, queue_depth: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(queue_depth.max(1));
        let join = std::thread::Builder::new()
            .name("evidence-publisher".to_string())
            .spawn(move || run_worker(rx, publisher))
            .context("spawning publisher worker")?;
        Ok(Self {
            tx,
            join: Some(join),
        })
    }

    /// Enqueue a report without blocking the decision path.
    pub fn try_submit(&self, job: ReportJob) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                log::warn!(
                    "publisher queue full, dropping report for {}",
                    job.evidence_path.display()
                );
            }
            Err(TrySendError::Disconnected(job)) => {
                log::warn!(
                    "publisher worker stopped, dropping report for {}",
                    job.evidence_path.display()
                );
            }
        }
    }

    /// Close the queue, let the worker finish what it holds, and join it.
    pub fn stop(self) -> Result<()> {
        let Self { tx, mut join } = self;
        drop(tx);
        if let Some(handle) = join.take() {
            handle
                .join()
                .map_err(|_| anyhow!("publisher worker panicked"))?;
        }
        Ok(())
    }
}

fn run_worker(rx: Receiver<ReportJob>, publisher: Box<dyn EvidencePublisher>) {
    for job in rx {
        match publisher.publish(&job) {
            Ok(url) => log::info!("evidence published: {}", url),
            Err(err) => log::warn!(
                "evidence publishing failed for {}: {:?}",
                job.evidence_path.display(),
                err
            ),
        }
    }
}
