/// Default filter: info everywhere, debug for the gateway itself so task
/// lifecycle traces show up without drowning in rmcp/hyper chatter.
pub fn default_filter() -> String {
    "info,meshy_mcp_gateway=debug".to_string()
}

pub fn init() {
    // Initialize tracing subscriber once; RUST_LOG overrides the default.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

/// Simple helper to log a metrics-like line until a real sink/exporter is added.
pub fn log_metric(tool: &str, metric: &str, value: f64) {
    tracing::info!(tool = tool, metric = metric, value = value, "metric");
}
