//! External collaborator interfaces the core depends on but does not
//! implement for real (§4.6): the candidate source and the three pipeline
//! stages an executor runs on each work item. Each is a narrow, one-method,
//! object-safe trait so tests can substitute in-memory fakes.
//!
//! The default implementations below are reference wiring, grounded on the
//! original system's own mock `GraphDB`/`VulnerabilityIndexer` stand-ins —
//! not a requirement to build real analysis, lookup, or ledger integrations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub item: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupRecord {
    pub item: String,
    pub known_cves: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub item: String,
    pub analysis: AnalysisRecord,
    pub vulnerabilities: LookupRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub item: String,
    pub accepted: bool,
}

/// Returns a finite sequence of work-item strings on demand. May be
/// non-deterministic; errors surface to the caller as an empty result.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(&self) -> Vec<String>;
}

/// Stage A: source-code analysis. May block; errors propagate to the
/// executor loop's catch.
#[async_trait]
pub trait StageA: Send + Sync {
    async fn analyze(&self, item: &str) -> Result<AnalysisRecord, StageError>;
}

/// Stage B: vulnerability lookup. Same error policy as stage A.
#[async_trait]
pub trait StageB: Send + Sync {
    async fn lookup(&self, item: &str) -> Result<LookupRecord, StageError>;
}

/// Stage C: ledger append / commit. Same error policy as stages A and B.
#[async_trait]
pub trait StageC: Send + Sync {
    async fn commit(&self, record: &PipelineRecord) -> Result<Ack, StageError>;
}

/// A fixed list of package-coordinate strings, shuffled and returned on each
/// call — a direct rendering of the original mock `GraphDB.get_clusters`.
pub struct InMemoryCandidateSource {
    clusters: Vec<String>,
}

impl InMemoryCandidateSource {
    pub fn new(clusters: Vec<String>) -> Self {
        Self { clusters }
    }

    pub fn with_default_clusters() -> Self {
        Self::new(
            [
                "react@16.0.0",
                "lodash@4.17.15",
                "express@4.16.0",
                "axios@0.19.0",
                "minimist@1.2.0",
                "yargs-parser@13.1.1",
                "handlebars@4.1.2",
                "node-fetch@2.6.0",
                "serialize-javascript@2.1.2",
                "ansi-regex@4.1.0",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        )
    }
}

#[async_trait]
impl CandidateSource for InMemoryCandidateSource {
    async fn candidates(&self) -> Vec<String> {
        let mut shuffled = self.clusters.clone();
        shuffled.shuffle(&mut rand::thread_rng());
        shuffled
    }
}

/// Stage A stub: returns a placeholder analysis record after a short
/// simulated delay, mirroring the original `run_gemma_check` stub.
pub struct NoopAnalyzer;

#[async_trait]
impl StageA for NoopAnalyzer {
    async fn analyze(&self, item: &str) -> Result<AnalysisRecord, StageError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(AnalysisRecord {
            item: item.to_string(),
            summary: "analysis pending implementation".to_string(),
        })
    }
}

/// Stage B stub: a small static map from package name to known CVE ids,
/// mirroring the original `VulnerabilityIndexer.get_known_cves`.
pub struct StaticCveLookup {
    known_cves: HashMap<String, Vec<String>>,
}

impl StaticCveLookup {
    pub fn new(known_cves: HashMap<String, Vec<String>>) -> Self {
        Self { known_cves }
    }

    pub fn with_default_database() -> Self {
        let mut known_cves = HashMap::new();
        known_cves.insert(
            "lodash".to_string(),
            vec!["CVE-2019-10744".to_string(), "CVE-2020-8203".to_string()],
        );
        known_cves.insert(
            "handlebars".to_string(),
            vec!["CVE-2019-19919".to_string()],
        );
        known_cves.insert(
            "minimist".to_string(),
            vec!["CVE-2020-7598".to_string()],
        );
        Self::new(known_cves)
    }

    fn package_name(item: &str) -> &str {
        item.split('@').next().unwrap_or(item)
    }
}

#[async_trait]
impl StageB for StaticCveLookup {
    async fn lookup(&self, item: &str) -> Result<LookupRecord, StageError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let known_cves = self
            .known_cves
            .get(Self::package_name(item))
            .cloned()
            .unwrap_or_default();
        Ok(LookupRecord {
            item: item.to_string(),
            known_cves,
        })
    }
}

/// Stage C stub: appends the merged record to an in-memory ledger, mirroring
/// the original `save_conclusion_to_blockchain` stub (the transaction hash
/// is left absent since there is no real ledger backing it).
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<Vec<PipelineRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<PipelineRecord> {
        self.entries.lock().expect("ledger mutex poisoned").clone()
    }
}

#[async_trait]
impl StageC for InMemoryLedger {
    async fn commit(&self, record: &PipelineRecord) -> Result<Ack, StageError> {
        self.entries
            .lock()
            .expect("ledger mutex poisoned")
            .push(record.clone());
        Ok(Ack {
            item: record.item.clone(),
            accepted: true,
        })
    }
}
