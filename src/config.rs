//! Command-line surface (§6, §10.1) and the `Settings` every component is
//! built from. Mirrors the teacher's `Options`/`From<&Options>` conversion
//! pattern: a `clap`-derived struct for parsing, a plain struct for use.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "argus",
    author,
    version,
    about = "Leased leader election and work dispatch for an audit-pipeline fleet"
)]
pub struct Cli {
    /// Unique identifier for this node (auto-generated if not provided).
    #[arg(long = "node-id", env = "ARGUS_NODE_ID")]
    pub node_id: Option<String>,

    /// Leader lease duration, in seconds.
    #[arg(long = "ttl", default_value_t = 5)]
    pub ttl: u64,

    /// Beacon period, in seconds.
    #[arg(long = "heartbeat-interval", default_value_t = 2.0)]
    pub heartbeat_interval: f64,

    /// Coordination-store connection string.
    #[arg(
        long = "store-url",
        default_value = "redis://127.0.0.1:6379",
        env = "ARGUS_STORE_URL"
    )]
    pub store_url: String,

    /// Namespace prefix shared by every coordination-store key.
    #[arg(long = "key-prefix", default_value = "argus")]
    pub key_prefix: String,

    /// Fraction of each cycle's candidates the scheduler admits to the queue.
    #[arg(long = "admit-fraction", default_value_t = 0.20)]
    pub admit_fraction: f64,

    /// Scheduler cycle sleep, in seconds.
    #[arg(long = "graph-search-interval", default_value_t = 10)]
    pub graph_search_interval: u64,

    /// Executor blocking-pop timeout, in seconds.
    #[arg(long = "task-timeout", default_value_t = 5)]
    pub task_timeout: u64,

    /// Consecutive beacon failures tolerated while leader before forced abdication.
    #[arg(long = "missed-beacon-threshold", default_value_t = 3)]
    pub missed_beacon_threshold: u32,

    /// TTL of this node's health key, in seconds.
    #[arg(long = "node-health-ttl", default_value_t = 10)]
    pub node_health_ttl: u64,

    /// Log verbosity; overridden by `RUST_LOG` when set.
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Runtime configuration every component is constructed from.
#[derive(Debug, Clone)]
pub struct Settings {
    pub node_id: String,
    pub lease_ttl: Duration,
    pub heartbeat_interval: Duration,
    pub key_prefix: String,
    pub admit_fraction: f64,
    pub graph_search_interval: Duration,
    pub task_timeout: Duration,
    pub missed_beacon_threshold: u32,
    pub node_health_ttl: Duration,
}

impl From<&Cli> for Settings {
    fn from(cli: &Cli) -> Self {
        Self {
            node_id: cli
                .node_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            lease_ttl: Duration::from_secs(cli.ttl),
            heartbeat_interval: Duration::from_secs_f64(cli.heartbeat_interval),
            key_prefix: cli.key_prefix.clone(),
            admit_fraction: cli.admit_fraction,
            graph_search_interval: Duration::from_secs(cli.graph_search_interval),
            task_timeout: Duration::from_secs(cli.task_timeout),
            missed_beacon_threshold: cli.missed_beacon_threshold,
            node_health_ttl: Duration::from_secs(cli.node_health_ttl),
        }
    }
}
