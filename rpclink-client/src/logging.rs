use tracing_subscriber::{fmt::time::ChronoUtc, EnvFilter};

/// Install a stderr subscriber with RFC 3339 timestamps.
///
/// `RUST_LOG` overrides the default of debug for the rpclink crates and warn
/// for everything else.
pub fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::new(
                "rpclink_core=debug,rpclink_transport=debug,rpclink_client=debug,rpclink_query=debug,warn",
            )
        });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Logging initialized");
    Ok(())
}

/// Initialize logging for tests; safe to call more than once.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rpclink_transport=trace,rpclink_client=trace,debug")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_logging_twice() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("still logging");
    }
}
