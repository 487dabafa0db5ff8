use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "ngnfs_mount=info";

// Install the stderr subscriber. RUST_LOG wins over the CLI level when set.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        level
            .map(|level| EnvFilter::new(format!("ngnfs_mount={level}")))
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_names(true),
        )
        .try_init();
}
