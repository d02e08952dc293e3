//! Leader-side work dispatch (§4.4): on each cycle, pull candidates, admit a
//! randomized fraction of them, and push the admitted batch onto the shared
//! work queue. Grounded on the original `leader.py`'s `run_scheduler_loop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::collaborators::CandidateSource;
use crate::config::Settings;
use crate::consensus::ConsensusDriver;
use crate::role::{RoleLoop, StopToken};
use crate::store::{Keys, Store};

pub struct Scheduler {
    store: Arc<dyn Store>,
    keys: Keys,
    settings: Settings,
    consensus: Arc<ConsensusDriver>,
    candidates: Arc<dyn CandidateSource>,
    stop: StopToken,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        keys: Keys,
        settings: Settings,
        consensus: Arc<ConsensusDriver>,
        candidates: Arc<dyn CandidateSource>,
    ) -> Self {
        Self {
            store,
            keys,
            settings,
            consensus,
            candidates,
            stop: StopToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// One admission cycle: fetch candidates, admit a randomized fraction,
    /// and push them to the work queue. Returns the number of items admitted.
    pub async fn cycle(&self) -> usize {
        let candidates = self.candidates.candidates().await;
        if candidates.is_empty() {
            return 0;
        }

        let admit_count = ((candidates.len() as f64 * self.settings.admit_fraction).floor()
            as usize)
            .max(1)
            .min(candidates.len());

        let mut rng = rand::thread_rng();
        let admitted: Vec<String> = candidates
            .choose_multiple(&mut rng, admit_count)
            .cloned()
            .collect();

        match self.store.push_back(&self.keys.work_queue(), &admitted).await {
            Ok(queue_len) => {
                info!(admitted = admitted.len(), queue_len, "admitted candidates to work queue");
                admitted.len()
            }
            Err(err) => {
                warn!(%err, "failed to push admitted candidates");
                0
            }
        }
    }
}

#[async_trait]
impl RoleLoop for Scheduler {
    async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!(node_id = %self.consensus.node_id(), "scheduler loop started");
        while !self.stop.is_stopped() {
            self.cycle().await;
            self.stop
                .sleep_or_wake(self.settings.graph_search_interval)
                .await;
        }
        info!(node_id = %self.consensus.node_id(), "scheduler loop stopped");
        self.running.store(false, Ordering::SeqCst);
    }

    fn request_stop(&self) {
        self.stop.stop();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
