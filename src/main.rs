use std::process::ExitCode;

use meshy_mcp_gateway::{cli, infra};

#[tokio::main]
async fn main() -> ExitCode {
    infra::logging::init();

    // Any arguments mean admin CLI; otherwise run the gateway.
    if std::env::args().len() > 1 {
        return cli::run().await;
    }

    match infra::boot::run_server().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}
