pub mod tool_router;

use rmcp::handler::server::tool::ToolRouter;

use crate::clients::meshy::MeshyRemote;
use crate::infra::config::AppConfig;
use tool_router::MeshySvc;

pub fn factory_with_client(client: MeshyRemote) -> (MeshySvc, ToolRouter<MeshySvc>) {
    (MeshySvc { client }, MeshySvc::router())
}

/// Factory required by the rmcp transports. A missing API key does not
/// prevent boot; tools return an actionable error until it is configured.
pub fn factory_from_env() -> (MeshySvc, ToolRouter<MeshySvc>) {
    let cfg = AppConfig::from_env_and_toml();
    if cfg.meshy.api_key.is_none() {
        tracing::warn!("MESHY_API_KEY not configured; Meshy tools will error until set");
    }
    factory_with_client(MeshyRemote::from_config(&cfg.meshy))
}
