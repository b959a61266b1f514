//! `NodeContext`: the bag of shared state every endpoint handler closes
//! over. Passed by reference from the dispatcher, never stashed behind a
//! global -- every handler receives the state it needs explicitly rather
//! than reaching through a process-wide singleton.

use crate::config::ConfigMutator;
use crate::dispatch::pool::WorkerPool;
use crate::registry::Registry;
use crate::smd::SmdClient;
use crate::stats::NodeStats;
use crate::sync::Counter;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

pub struct NodeContext {
    pub registry: Registry,
    pub config: Arc<ConfigMutator>,
    pub stats: Arc<NodeStats>,
    pub smd: Arc<dyn SmdClient>,
    pub build: &'static str,
    pub shutdown: Arc<AtomicBool>,
    /// Heartbeat seed addresses added at runtime via `tip`/cleared via
    /// `tip-clear`, supplementing whatever seeds were configured at startup.
    pub tip_list: Mutex<Vec<String>>,
    /// The live Info worker pool, resized in place when `config-set:context=
    /// service;info-threads=<n>` succeeds.
    pub pool: Arc<WorkerPool>,
    /// Stands in for the cluster-exchange subsystem's monotonically
    /// increasing cluster key: `cluster-stable` reads this before and after
    /// enumerating namespaces and rejects with `unstable-cluster` if it
    /// moved mid-collection. Real membership changes bump it; this
    /// workspace has no heartbeat/exchange subsystem of its own, so tests
    /// and operators bump it directly.
    pub cluster_key: Counter,
}

impl NodeContext {
    pub fn new(
        config: Arc<ConfigMutator>,
        stats: Arc<NodeStats>,
        smd: Arc<dyn SmdClient>,
        build: &'static str,
        pool: Arc<WorkerPool>,
    ) -> NodeContext {
        NodeContext {
            registry: Registry::new(),
            config,
            stats,
            smd,
            build,
            shutdown: Arc::new(AtomicBool::new(false)),
            tip_list: Mutex::new(Vec::new()),
            pool,
            cluster_key: Counter::new(1),
        }
    }
}
