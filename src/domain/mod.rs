//! Task lifecycle model for the Meshy upstream.
//!
//! The upstream exposes four asynchronous task families behind slightly
//! different endpoints, and is inconsistent about which response field
//! carries a freshly created task id. Everything that papers over that
//! lives here: the endpoint table, the normalized status/creation types,
//! and the pass-through request models with their upstream defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// The four upstream task families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    TextTo3d,
    ImageTo3d,
    Remesh,
    TextToTexture,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::TextTo3d,
        TaskKind::ImageTo3d,
        TaskKind::Remesh,
        TaskKind::TextToTexture,
    ];

    /// Endpoint path under the upstream base URL. Note text-to-3d is the
    /// only v2 endpoint.
    pub fn endpoint(self) -> &'static str {
        match self {
            TaskKind::TextTo3d => "openapi/v2/text-to-3d",
            TaskKind::ImageTo3d => "openapi/v1/image-to-3d",
            TaskKind::Remesh => "openapi/v1/remesh",
            TaskKind::TextToTexture => "openapi/v1/text-to-texture",
        }
    }

    /// Field that holds the new task id in a creation response. The v2
    /// endpoint and text-to-texture use "result"; the rest use "id".
    pub fn created_id_field(self) -> &'static str {
        match self {
            TaskKind::TextTo3d | TaskKind::TextToTexture => "result",
            TaskKind::ImageTo3d | TaskKind::Remesh => "id",
        }
    }

    /// Stable kebab-case name, used in resource URIs and the poll tool.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::TextTo3d => "text-to-3d",
            TaskKind::ImageTo3d => "image-to-3d",
            TaskKind::Remesh => "remesh",
            TaskKind::TextToTexture => "text-to-texture",
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = MeshyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text-to-3d" => Ok(TaskKind::TextTo3d),
            "image-to-3d" => Ok(TaskKind::ImageTo3d),
            "remesh" => Ok(TaskKind::Remesh),
            "text-to-texture" => Ok(TaskKind::TextToTexture),
            other => Err(MeshyError::UnknownTaskKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream task status. Unknown strings deserialize to `Unknown` so a
/// polling/streaming loop never panics on a new upstream state; the loop
/// stays bounded by its timeout instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// Status of a raw task object, if it carries one.
    pub fn of(task: &JsonValue) -> Option<TaskStatus> {
        task.get("status")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Normalized result of a task creation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedTask {
    pub id: String,
}

impl CreatedTask {
    /// Pull the new task id out of a creation response, trying the kind's
    /// documented field first and the sibling spelling second.
    pub fn from_response(kind: TaskKind, body: &JsonValue) -> Result<Self, MeshyError> {
        let primary = kind.created_id_field();
        let fallback = if primary == "result" { "id" } else { "result" };
        let id = body
            .get(primary)
            .or_else(|| body.get(fallback))
            .and_then(|v| v.as_str())
            .ok_or_else(|| MeshyError::MissingTaskId(kind))?;
        Ok(CreatedTask { id: id.to_string() })
    }
}

fn default_art_style() -> String {
    "realistic".to_string()
}

fn default_true() -> bool {
    true
}

/// Request body for a text-to-3d task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextTo3dRequest {
    /// "preview" or "refine".
    pub mode: String,
    pub prompt: String,
    #[serde(default = "default_art_style")]
    pub art_style: String,
    #[serde(default = "default_true")]
    pub should_remesh: bool,
}

fn default_target_formats() -> Vec<String> {
    vec!["glb".to_string(), "fbx".to_string()]
}

fn default_topology() -> String {
    "quad".to_string()
}

fn default_polycount() -> u64 {
    50_000
}

fn default_resize_height() -> f64 {
    1.0
}

fn default_origin_at() -> String {
    "bottom".to_string()
}

/// Request body for a remesh task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemeshRequest {
    pub input_task_id: String,
    #[serde(default = "default_target_formats")]
    pub target_formats: Vec<String>,
    #[serde(default = "default_topology")]
    pub topology: String,
    #[serde(default = "default_polycount")]
    pub target_polycount: u64,
    #[serde(default = "default_resize_height")]
    pub resize_height: f64,
    #[serde(default = "default_origin_at")]
    pub origin_at: String,
}

/// Request body for an image-to-3d task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageTo3dRequest {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default = "default_art_style")]
    pub art_style: String,
}

fn default_resolution() -> String {
    "1024".to_string()
}

/// Request body for a text-to-texture task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextToTextureRequest {
    pub model_url: String,
    pub object_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub enable_original_uv: bool,
    #[serde(default = "default_true")]
    pub enable_pbr: bool,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_art_style")]
    pub art_style: String,
}

fn default_page_size() -> u32 {
    10
}

fn default_page() -> u32 {
    1
}

/// Pagination for task listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListTasksPage {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page")]
    pub page: u32,
}

impl Default for ListTasksPage {
    fn default() -> Self {
        ListTasksPage {
            page_size: default_page_size(),
            page: default_page(),
        }
    }
}

/// Errors from the upstream adapter, mapped to MCP errors at the tool
/// boundary.
#[derive(Debug, Error)]
pub enum MeshyError {
    #[error("MESHY_API_KEY not configured; set it to enable Meshy tools")]
    MissingApiKey,
    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),
    #[error("creation response for {0} carried no task id")]
    MissingTaskId(TaskKind),
    #[error("upstream status {status}: {body}")]
    UpstreamStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream response decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("stream for task {0} timed out after {1}s")]
    StreamTimeout(String, u64),
    #[error("stream for task {0} ended without any data")]
    StreamEnded(String),
    #[error("poll for task {0} timed out after {1}s")]
    PollTimeout(String, u64),
}

impl MeshyError {
    /// Server errors and transport failures are worth another attempt;
    /// everything else (4xx included) is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            MeshyError::Transport(_) => true,
            MeshyError::UpstreamStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
