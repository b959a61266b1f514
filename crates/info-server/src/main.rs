use info_core::config::{ConfigMutator, NamespaceConfig};
use info_core::dispatch::pool::WorkerPool;
use info_core::node::NodeContext;
use info_core::stats::NodeStats;
use info_core::ticker::{
    NamespaceEntry, NoProcessMetrics, NoSystemMetrics, PoolQueueDepths, SingleNodeView, Ticker,
};
use info_server::{cli::Cli, endpoints, listener, logging, settings::Settings, smd_client::LocalSmdClient};
use slog::info;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse_args();

    let settings = match &cli.config {
        Some(path) => Settings::load(path).unwrap_or_else(|err| {
            eprintln!("failed to load config: {}", err);
            std::process::exit(1);
        }),
        None => Settings::default(),
    };

    let logger = logging::init(&settings.log_level);

    if cli.check_config {
        info!(logger, "configuration parsed successfully"; "bind" => &settings.bind);
        return;
    }

    let bind = cli.bind.clone().unwrap_or_else(|| settings.bind.clone());

    let config = Arc::new(ConfigMutator::new(settings.enterprise));
    for ns in &settings.namespaces {
        config.add_namespace(ns.name.clone(), NamespaceConfig::new(ns.memory_size));
    }

    let stats = Arc::new(NodeStats::default());
    let smd = Arc::new(LocalSmdClient::new());
    let pool = Arc::new(WorkerPool::new(settings.core_threads, settings.max_threads, settings.queue_depth));

    let ctx = Arc::new(NodeContext::new(config.clone(), stats.clone(), smd, build_string(), pool.clone()));
    endpoints::register_all(&ctx);

    let ticker_namespaces: Vec<NamespaceEntry> = settings
        .namespaces
        .iter()
        .map(|ns| NamespaceEntry {
            name: ns.name.clone(),
            memory_size: ns.memory_size,
            stats: Arc::new(info_core::stats::NamespaceStats::default()),
        })
        .collect();

    let ticker_logger = logger.new(slog::o!("component" => "ticker"));
    let ticker = Ticker::new(
        ticker_logger,
        stats,
        config,
        ticker_namespaces,
        ctx.shutdown.clone(),
        Arc::new(SingleNodeView::new(settings.node_id.clone())),
        Arc::new(NoSystemMetrics),
        Arc::new(NoProcessMetrics),
        Arc::new(PoolQueueDepths::new(pool.clone())),
    );
    std::thread::spawn(move || ticker.run());

    info!(logger, "info-server starting"; "bind" => &bind);
    if let Err(err) = listener::serve(&bind, ctx, pool, logger.clone()) {
        slog::error!(logger, "listener exited with error"; "error" => %err);
        std::process::exit(1);
    }
}

fn build_string() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), "-", env!("CARGO_PKG_NAME"))
}
