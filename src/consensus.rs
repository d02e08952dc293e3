//! Lease-based consensus driver (§4.2): acquire-or-confirm leadership,
//! renew it on a beacon, and expose the node-health bookkeeping the
//! supervisor and scheduler need. Grounded on the original `consensus.py`
//! and the teacher's `leader.rs` acquire/renew split.
//!
//! Open question (§9) resolved in the expanded spec §10.9: the beacon loop
//! is the sole renewer of an already-held lease's TTL. `attempt_leadership`
//! only ever creates the lease if absent or reads it to confirm/detect loss;
//! it never calls `expire` on a lease this node already holds.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::store::{Keys, Store, StoreError};

pub struct ConsensusDriver {
    store: Arc<dyn Store>,
    keys: Keys,
    node_id: String,
    lease_ttl: Duration,
    node_health_ttl: Duration,
    missed_beacon_threshold: u32,
    missed_beacons: AtomicU32,
    is_leader: AtomicBool,
}

impl ConsensusDriver {
    pub fn new(
        store: Arc<dyn Store>,
        keys: Keys,
        node_id: String,
        lease_ttl: Duration,
        node_health_ttl: Duration,
        missed_beacon_threshold: u32,
    ) -> Self {
        Self {
            store,
            keys,
            node_id,
            lease_ttl,
            node_health_ttl,
            missed_beacon_threshold,
            missed_beacons: AtomicU32::new(0),
            is_leader: AtomicBool::new(false),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Attempts to claim the lease if it is absent, otherwise checks whether
    /// this node already holds it. Returns true iff this node is leader
    /// after the call. Never extends the TTL of a lease it already holds.
    /// A store error here demotes immediately, unlike a sub-threshold
    /// `beacon` failure — the original system's semantics treat any
    /// exception on the claim/confirm path as an unconfirmed leadership
    /// state, not something to be tolerated.
    pub async fn attempt_leadership(&self) -> Result<bool, StoreError> {
        let claimed = self
            .store
            .try_claim(&self.keys.leader(), &self.node_id, self.lease_ttl)
            .await?;
        if claimed {
            info!(node_id = %self.node_id, "acquired leadership lease");
            self.missed_beacons.store(0, Ordering::SeqCst);
            self.is_leader.store(true, Ordering::SeqCst);
            return Ok(true);
        }

        let holder = self.store.get(&self.keys.leader()).await?;
        let is_leader = holder.as_deref() == Some(self.node_id.as_str());
        self.is_leader.store(is_leader, Ordering::SeqCst);
        Ok(is_leader)
    }

    /// Renews this node's own health key and, if leader, the leadership
    /// lease's TTL. Returns the node's leadership state after the call.
    ///
    /// A store error below `missed_beacon_threshold` has no role
    /// consequence: it is logged and the last known leadership state is
    /// returned unchanged, matching "any exception increments
    /// missed-beacons; crossing the configured miss threshold ... forces
    /// an abdication" — a single transient failure must not itself demote
    /// a node still holding the lease. Only once the threshold is crossed
    /// does this method force an abdication and report `false`.
    pub async fn beacon(&self) -> Result<bool, StoreError> {
        match self.run_beacon().await {
            Ok(still_leader) => {
                self.missed_beacons.store(0, Ordering::SeqCst);
                self.is_leader.store(still_leader, Ordering::SeqCst);
                Ok(still_leader)
            }
            Err(err) => {
                let missed = self.missed_beacons.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(node_id = %self.node_id, %err, missed, "beacon failed");
                if missed < self.missed_beacon_threshold {
                    return Ok(self.is_leader.load(Ordering::SeqCst));
                }

                warn!(
                    node_id = %self.node_id,
                    missed,
                    "missed-beacon threshold exceeded, forcing abdication"
                );
                if let Err(abdicate_err) = self.abdicate().await {
                    warn!(node_id = %self.node_id, %abdicate_err, "failed to abdicate after missed-beacon threshold");
                }
                self.is_leader.store(false, Ordering::SeqCst);
                Ok(false)
            }
        }
    }

    async fn run_beacon(&self) -> Result<bool, StoreError> {
        self.store
            .set_with_ttl(&self.keys.node(&self.node_id), "alive", self.node_health_ttl)
            .await?;

        let holder = self.store.get(&self.keys.leader()).await?;
        let still_leader = holder.as_deref() == Some(self.node_id.as_str());
        if still_leader {
            self.store.expire(&self.keys.leader(), self.lease_ttl).await?;
        }
        self.store.incr(&self.keys.heartbeat_count()).await?;
        Ok(still_leader)
    }

    /// Releases the lease if this node currently holds it. Idempotent.
    /// Clears the local leadership flag in all cases, even if the store
    /// read/delete itself fails.
    pub async fn abdicate(&self) -> Result<(), StoreError> {
        let result = self.abdicate_inner().await;
        self.is_leader.store(false, Ordering::SeqCst);
        self.missed_beacons.store(0, Ordering::SeqCst);
        result
    }

    async fn abdicate_inner(&self) -> Result<(), StoreError> {
        let holder = self.store.get(&self.keys.leader()).await?;
        if holder.as_deref() == Some(self.node_id.as_str()) {
            self.store.delete(&self.keys.leader()).await?;
            info!(node_id = %self.node_id, "abdicated leadership");
        }
        Ok(())
    }

    /// Removes this node's own health key. Called once on clean shutdown.
    pub async fn cleanup(&self) -> Result<(), StoreError> {
        self.store.delete(&self.keys.node(&self.node_id)).await
    }

    /// Counts keys matching the `node/*` pattern via prefix enumeration.
    /// Used only for observability; the scheduler's admission formula does
    /// not depend on this value.
    pub async fn active_node_count(&self) -> Result<usize, StoreError> {
        let keys = self.store.scan_prefix(&self.keys.node_pattern()).await?;
        Ok(keys.len())
    }
}
