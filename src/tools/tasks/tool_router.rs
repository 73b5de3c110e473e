//! MCP tool and resource surface over the Meshy task lifecycle.
//!
//! Every tool is a thin forwarder: parse arguments into the domain request
//! model, call the upstream client, return plain JSON as structuredContent.
//! Create tools answer `{"id": ...}`; retrieve/stream/poll answer the
//! upstream task object untouched; list answers the upstream array.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};

use rmcp::{
    handler::server::tool::{Parameters, ToolRouter},
    model::{
        AnnotateAble, Implementation, JsonObject, ListResourceTemplatesResult,
        ListResourcesResult, PaginatedRequestParam, ProtocolVersion, RawResource,
        RawResourceTemplate, ReadResourceRequestParam, ReadResourceResult, ResourceContents,
        ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    ErrorData as McpError, RoleServer, ServerHandler,
};

use crate::clients::meshy::MeshyRemote;
use crate::domain::{
    ImageTo3dRequest, ListTasksPage, MeshyError, RemeshRequest, TaskKind, TextTo3dRequest,
    TextToTextureRequest,
};

#[derive(Clone)]
pub struct MeshySvc {
    pub client: MeshyRemote,
}

fn to_mcp(e: MeshyError) -> McpError {
    match e {
        MeshyError::UnknownTaskKind(_) => McpError::invalid_params(e.to_string(), None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

impl MeshySvc {
    fn parse_args<T: DeserializeOwned>(params: JsonObject) -> Result<T, McpError> {
        serde_json::from_value(JsonValue::Object(params))
            .map_err(|e| McpError::invalid_params(format!("invalid arguments: {e}"), None))
    }

    fn task_id_of(params: &JsonObject) -> Result<String, McpError> {
        params
            .get("task_id")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| McpError::invalid_params("missing required field: task_id", None))
    }

    fn timeout_of(&self, params: &JsonObject) -> Result<Duration, McpError> {
        match params.get("timeout") {
            None => Ok(self.client.default_stream_timeout()),
            Some(v) => v.as_u64().map(Duration::from_secs).ok_or_else(|| {
                McpError::invalid_params("timeout must be an integer number of seconds", None)
            }),
        }
    }

    async fn create<T: DeserializeOwned + serde::Serialize>(
        &self,
        kind: TaskKind,
        params: JsonObject,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        let req: T = Self::parse_args(params)?;
        let payload = serde_json::to_value(&req)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let created = self.client.create_task(kind, &payload).await.map_err(to_mcp)?;
        Ok(rmcp::Json(json!({"id": created.id})))
    }

    async fn retrieve(
        &self,
        kind: TaskKind,
        params: JsonObject,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        let task_id = Self::task_id_of(&params)?;
        let task = self.client.retrieve_task(kind, &task_id).await.map_err(to_mcp)?;
        Ok(rmcp::Json(task))
    }

    async fn list(
        &self,
        kind: TaskKind,
        params: JsonObject,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        let page: ListTasksPage = Self::parse_args(params)?;
        let tasks = self.client.list_tasks(kind, page).await.map_err(to_mcp)?;
        Ok(rmcp::Json(tasks))
    }

    async fn stream(
        &self,
        kind: TaskKind,
        params: JsonObject,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        let task_id = Self::task_id_of(&params)?;
        let timeout = self.timeout_of(&params)?;
        let task = self
            .client
            .stream_task(kind, &task_id, timeout)
            .await
            .map_err(to_mcp)?;
        Ok(rmcp::Json(task))
    }
}

#[rmcp::tool_router]
impl MeshySvc {
    #[rmcp::tool(
        name = "meshy.text_to_3d.create",
        description = "Create a Text to 3D task from a prompt. Args: mode ('preview'|'refine'), prompt, art_style, should_remesh. Returns {\"id\": ...}"
    )]
    async fn text_to_3d_create(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.create::<TextTo3dRequest>(TaskKind::TextTo3d, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.text_to_3d.retrieve",
        description = "Retrieve a Text to 3D task by task_id; returns the upstream task object"
    )]
    async fn text_to_3d_retrieve(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.retrieve(TaskKind::TextTo3d, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.text_to_3d.list",
        description = "List Text to 3D tasks. Args: page_size (default 10), page (default 1)"
    )]
    async fn text_to_3d_list(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.list(TaskKind::TextTo3d, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.text_to_3d.stream",
        description = "Follow a Text to 3D task over SSE until it reaches a terminal status. Args: task_id, timeout (seconds)"
    )]
    async fn text_to_3d_stream(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.stream(TaskKind::TextTo3d, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.image_to_3d.create",
        description = "Create an Image to 3D task. Args: image_url, prompt (optional), art_style. Returns {\"id\": ...}"
    )]
    async fn image_to_3d_create(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.create::<ImageTo3dRequest>(TaskKind::ImageTo3d, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.image_to_3d.retrieve",
        description = "Retrieve an Image to 3D task by task_id; returns the upstream task object"
    )]
    async fn image_to_3d_retrieve(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.retrieve(TaskKind::ImageTo3d, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.image_to_3d.list",
        description = "List Image to 3D tasks. Args: page_size (default 10), page (default 1)"
    )]
    async fn image_to_3d_list(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.list(TaskKind::ImageTo3d, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.image_to_3d.stream",
        description = "Follow an Image to 3D task over SSE until it reaches a terminal status. Args: task_id, timeout (seconds)"
    )]
    async fn image_to_3d_stream(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.stream(TaskKind::ImageTo3d, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.remesh.create",
        description = "Create a Remesh task for an existing model. Args: input_task_id, target_formats, topology, target_polycount, resize_height, origin_at. Returns {\"id\": ...}"
    )]
    async fn remesh_create(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.create::<RemeshRequest>(TaskKind::Remesh, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.remesh.retrieve",
        description = "Retrieve a Remesh task by task_id; returns the upstream task object"
    )]
    async fn remesh_retrieve(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.retrieve(TaskKind::Remesh, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.remesh.list",
        description = "List Remesh tasks. Args: page_size (default 10), page (default 1)"
    )]
    async fn remesh_list(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.list(TaskKind::Remesh, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.remesh.stream",
        description = "Follow a Remesh task over SSE until it reaches a terminal status. Args: task_id, timeout (seconds)"
    )]
    async fn remesh_stream(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.stream(TaskKind::Remesh, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.text_to_texture.create",
        description = "Create a Text to Texture task. Args: model_url, object_prompt, style_prompt, enable_original_uv, enable_pbr, resolution, negative_prompt, art_style. Returns {\"id\": ...}"
    )]
    async fn text_to_texture_create(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.create::<TextToTextureRequest>(TaskKind::TextToTexture, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.text_to_texture.retrieve",
        description = "Retrieve a Text to Texture task by task_id; returns the upstream task object"
    )]
    async fn text_to_texture_retrieve(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.retrieve(TaskKind::TextToTexture, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.text_to_texture.list",
        description = "List Text to Texture tasks. Args: page_size (default 10), page (default 1)"
    )]
    async fn text_to_texture_list(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.list(TaskKind::TextToTexture, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.text_to_texture.stream",
        description = "Follow a Text to Texture task over SSE until it reaches a terminal status. Args: task_id, timeout (seconds)"
    )]
    async fn text_to_texture_stream(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        self.stream(TaskKind::TextToTexture, params.0).await
    }

    #[rmcp::tool(
        name = "meshy.task.poll",
        description = "Poll any task until it reaches a terminal status. Args: kind ('text-to-3d'|'image-to-3d'|'remesh'|'text-to-texture'), task_id, timeout (seconds)"
    )]
    async fn task_poll(
        &self,
        params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        let kind = params
            .0
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| McpError::invalid_params("missing required field: kind", None))?
            .parse::<TaskKind>()
            .map_err(to_mcp)?;
        let task_id = Self::task_id_of(&params.0)?;
        let timeout = self.timeout_of(&params.0)?;
        let task = self
            .client
            .poll_task(kind, &task_id, timeout)
            .await
            .map_err(to_mcp)?;
        Ok(rmcp::Json(task))
    }

    #[rmcp::tool(
        name = "meshy.balance",
        description = "Get the remaining credit balance of the Meshy account"
    )]
    async fn balance(
        &self,
        _params: Parameters<JsonObject>,
    ) -> Result<rmcp::Json<JsonValue>, McpError> {
        let out = self.client.balance().await.map_err(to_mcp)?;
        Ok(rmcp::Json(out))
    }
}

impl ServerHandler for MeshySvc {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Gateway to the Meshy 3D-generation API. Create tasks with the \
                 *.create tools, then follow them with *.stream or meshy.task.poll; \
                 task details are also readable as task://{kind}/{task_id} resources."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let mut health = RawResource::new("health://status", "health");
        health.description = Some("Gateway health and API key state".to_string());
        health.mime_type = Some("application/json".to_string());
        Ok(ListResourcesResult {
            resources: vec![health.no_annotation()],
            next_cursor: None,
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let resource_templates = TaskKind::ALL
            .iter()
            .map(|kind| {
                RawResourceTemplate {
                    uri_template: format!("task://{kind}/{{task_id}}"),
                    name: format!("{kind} task"),
                    description: Some(format!("Details and results of a {kind} task")),
                    mime_type: Some("application/json".to_string()),
                }
                .no_annotation()
            })
            .collect();
        Ok(ListResourceTemplatesResult {
            resource_templates,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let payload = self.read_resource_json(&request.uri).await?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(payload.to_string(), request.uri)],
        })
    }
}

impl MeshySvc {
    async fn read_resource_json(&self, uri: &str) -> Result<JsonValue, McpError> {
        if uri == "health://status" {
            return Ok(json!({
                "status": "ok",
                "api_key_configured": self.client.api_key_configured(),
            }));
        }
        let rest = uri
            .strip_prefix("task://")
            .ok_or_else(|| McpError::resource_not_found(format!("unknown resource: {uri}"), None))?;
        let (kind, task_id) = rest
            .split_once('/')
            .filter(|(_, id)| !id.is_empty())
            .ok_or_else(|| {
                McpError::resource_not_found(format!("malformed task resource: {uri}"), None)
            })?;
        let kind = kind
            .parse::<TaskKind>()
            .map_err(|e| McpError::resource_not_found(e.to_string(), None))?;
        self.client.retrieve_task(kind, task_id).await.map_err(to_mcp)
    }
}

pub type MeshyRouter = ToolRouter<MeshySvc>;

impl MeshySvc {
    pub fn router() -> MeshyRouter {
        // Wrapper to expose the macro-generated private tool_router
        Self::tool_router()
    }
}
