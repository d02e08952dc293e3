//! Process supervisor (§4.3): runs a consensus loop and a beacon loop as two
//! independent background tasks, and switches the single active role
//! (scheduler or executor) whenever either one's outcome disagrees with
//! what is currently running. Grounded on the original `main.py`'s
//! orchestrator and the teacher's `main.rs` background-task wiring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::collaborators::{CandidateSource, StageA, StageB, StageC};
use crate::config::Settings;
use crate::consensus::ConsensusDriver;
use crate::executor::Executor;
use crate::role::{RoleLoop, StopToken};
use crate::scheduler::Scheduler;
use crate::shutdown::ShutdownSignal;
use crate::store::{Keys, Store};

const ROLE_STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Unset,
    Leader,
    Follower,
}

struct ActiveRole {
    role: Role,
    handle: Arc<dyn RoleLoop>,
    join: JoinHandle<()>,
}

pub struct Supervisor {
    store: Arc<dyn Store>,
    keys: Keys,
    settings: Settings,
    consensus: Arc<ConsensusDriver>,
    candidates: Arc<dyn CandidateSource>,
    stage_a: Arc<dyn StageA>,
    stage_b: Arc<dyn StageB>,
    stage_c: Arc<dyn StageC>,
    active: Mutex<Option<ActiveRole>>,
    background_stop: StopToken,
    running: AtomicBool,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        keys: Keys,
        settings: Settings,
        consensus: Arc<ConsensusDriver>,
        candidates: Arc<dyn CandidateSource>,
        stage_a: Arc<dyn StageA>,
        stage_b: Arc<dyn StageB>,
        stage_c: Arc<dyn StageC>,
    ) -> Self {
        Self {
            store,
            keys,
            settings,
            consensus,
            candidates,
            stage_a,
            stage_b,
            stage_c,
            active: Mutex::new(None),
            background_stop: StopToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Runs the supervisor until `shutdown` resolves. Programmer error to
    /// call twice concurrently on the same instance; logged and a no-op.
    pub async fn run(self: &Arc<Self>, mut shutdown: ShutdownSignal) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("supervisor already running, ignoring duplicate start");
            return;
        }

        let consensus_handle = tokio::spawn(self.clone().consensus_loop());
        let beacon_handle = tokio::spawn(self.clone().beacon_loop());

        shutdown.wait().await;
        info!("shutdown requested, stopping supervisor");

        self.background_stop.stop();
        let _ = tokio::time::timeout(ROLE_STOP_JOIN_TIMEOUT, consensus_handle).await;
        let _ = tokio::time::timeout(ROLE_STOP_JOIN_TIMEOUT, beacon_handle).await;

        self.stop_active_role().await;
        if let Err(err) = self.consensus.abdicate().await {
            warn!(%err, "failed to abdicate during shutdown");
        }
        if let Err(err) = self.consensus.cleanup().await {
            warn!(%err, "failed to clean up node-health key during shutdown");
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Calls `attempt_leadership` every `lease_ttl / 2` and reconciles the
    /// active role against its outcome.
    async fn consensus_loop(self: Arc<Self>) {
        let interval = self.settings.lease_ttl / 2;
        loop {
            if self.background_stop.is_stopped() {
                return;
            }

            let is_leader = match self.consensus.attempt_leadership().await {
                Ok(is_leader) => is_leader,
                Err(err) => {
                    warn!(%err, "leadership attempt failed, remaining follower");
                    false
                }
            };
            self.reconcile(is_leader).await;

            self.background_stop.sleep_or_wake(interval).await;
        }
    }

    /// Calls `beacon` every `heartbeat_interval` and reconciles the active
    /// role against its outcome (a beacon can discover a lost lease between
    /// consensus ticks and must demote promptly). A bare `Err` here is not
    /// reconciled against — unlike `consensus_loop`, where any failure
    /// means leadership was never confirmed, `beacon` already absorbs
    /// sub-threshold store errors internally and only forces a role change
    /// once `missed_beacon_threshold` is crossed. Reconciling on a surfaced
    /// error here would thrash the active role on a single transient
    /// hiccup the counter was specifically meant to tolerate.
    async fn beacon_loop(self: Arc<Self>) {
        loop {
            if self.background_stop.is_stopped() {
                return;
            }

            match self.consensus.beacon().await {
                Ok(is_leader) => self.reconcile(is_leader).await,
                Err(err) => warn!(%err, "beacon failed"),
            }

            self.background_stop
                .sleep_or_wake(self.settings.heartbeat_interval)
                .await;
        }
    }

    /// Switches the active role if `is_leader` disagrees with what is
    /// currently running. Holds the active-role lock for the entire
    /// check-then-switch so the consensus and beacon loops never race each
    /// other into starting two role loops at once.
    async fn reconcile(self: &Arc<Self>, is_leader: bool) {
        let desired = if is_leader { Role::Leader } else { Role::Follower };
        let mut active = self.active.lock().await;
        let current = active.as_ref().map(|a| a.role).unwrap_or(Role::Unset);
        if current == desired {
            return;
        }

        info!(?current, ?desired, "role transition");
        if let Some(previous) = active.take() {
            previous.handle.request_stop();
            if tokio::time::timeout(ROLE_STOP_JOIN_TIMEOUT, previous.join)
                .await
                .is_err()
            {
                warn!("role loop did not stop within the shutdown timeout");
            }
        }

        let handle: Arc<dyn RoleLoop> = match desired {
            Role::Leader => Arc::new(Scheduler::new(
                self.store.clone(),
                self.keys.clone(),
                self.settings.clone(),
                self.consensus.clone(),
                self.candidates.clone(),
            )),
            Role::Follower => Arc::new(Executor::new(
                self.store.clone(),
                self.keys.clone(),
                self.settings.clone(),
                self.stage_a.clone(),
                self.stage_b.clone(),
                self.stage_c.clone(),
            )),
            Role::Unset => unreachable!("reconcile never targets the unset role"),
        };

        let join = tokio::spawn(handle.clone().run());
        *active = Some(ActiveRole {
            role: desired,
            handle,
            join,
        });
    }

    async fn stop_active_role(&self) {
        let previous = self.active.lock().await.take();
        if let Some(active) = previous {
            active.handle.request_stop();
            if tokio::time::timeout(ROLE_STOP_JOIN_TIMEOUT, active.join)
                .await
                .is_err()
            {
                warn!("role loop did not stop within the shutdown timeout");
            }
        }
    }
}
