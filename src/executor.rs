//! Follower-side work consumption (§4.5): block-pop an item from the work
//! queue and run it through stages A, B, C in sequence. Grounded on the
//! original `follower.py`'s `run_worker_loop`.
//!
//! Error containment per §7: a stage failure drops the item (logged) rather
//! than retrying or requeuing it. There is no redelivery guarantee.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::collaborators::{PipelineRecord, StageA, StageB, StageC};
use crate::config::Settings;
use crate::role::{RoleLoop, StopToken};
use crate::store::{Keys, Store};

pub struct Executor {
    store: Arc<dyn Store>,
    keys: Keys,
    settings: Settings,
    stage_a: Arc<dyn StageA>,
    stage_b: Arc<dyn StageB>,
    stage_c: Arc<dyn StageC>,
    stop: StopToken,
    running: AtomicBool,
}

impl Executor {
    pub fn new(
        store: Arc<dyn Store>,
        keys: Keys,
        settings: Settings,
        stage_a: Arc<dyn StageA>,
        stage_b: Arc<dyn StageB>,
        stage_c: Arc<dyn StageC>,
    ) -> Self {
        Self {
            store,
            keys,
            settings,
            stage_a,
            stage_b,
            stage_c,
            stop: StopToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Pops one item (bounded by the configured timeout) and, if present,
    /// runs it through the pipeline. Returns true iff an item was processed.
    pub async fn cycle(&self) -> bool {
        let popped = match self
            .store
            .pop_front_blocking(&self.keys.work_queue(), self.settings.task_timeout)
            .await
        {
            Ok(popped) => popped,
            Err(err) => {
                warn!(%err, "failed to pop from work queue");
                return false;
            }
        };

        let Some((_, item)) = popped else {
            return false;
        };

        self.process(&item).await;
        true
    }

    async fn process(&self, item: &str) {
        let analysis = match self.stage_a.analyze(item).await {
            Ok(record) => record,
            Err(err) => {
                warn!(item, %err, "stage A failed, dropping item");
                return;
            }
        };

        let vulnerabilities = match self.stage_b.lookup(item).await {
            Ok(record) => record,
            Err(err) => {
                warn!(item, %err, "stage B failed, dropping item");
                return;
            }
        };

        let record = PipelineRecord {
            item: item.to_string(),
            analysis,
            vulnerabilities,
        };

        match self.stage_c.commit(&record).await {
            Ok(ack) => {
                info!(item, accepted = ack.accepted, "item processed");
            }
            Err(err) => {
                warn!(item, %err, "stage C failed, dropping item");
            }
        }
    }
}

#[async_trait]
impl RoleLoop for Executor {
    async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!("executor loop started");
        while !self.stop.is_stopped() {
            // On a timed-out pop, reloop immediately into another blocking
            // pop; the loop condition above already re-checks the stop flag.
            self.cycle().await;
        }
        info!("executor loop stopped");
        self.running.store(false, Ordering::SeqCst);
    }

    fn request_stop(&self) {
        self.stop.stop();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
