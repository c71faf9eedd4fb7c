use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// Session payload piped on stdin for every status-line refresh.
/// Every field is optional; a missing or malformed payload still renders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInput {
    #[serde(default, deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: ModelInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub workspace: WorkspaceInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost: CostInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceInfo {
    #[serde(default)]
    pub current_dir: Option<String>,
    #[serde(default)]
    pub project_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CostInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_cost_usd: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_duration_ms: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_lines_added: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_lines_removed: u64,
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SessionInput {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(raw) {
            Ok(input) => input,
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse session payload, rendering defaults");
                Self::default()
            }
        }
    }

    /// Directory the session is working in, preferring the workspace view.
    pub fn working_dir(&self) -> Option<&str> {
        self.workspace
            .current_dir
            .as_deref()
            .or(self.cwd.as_deref())
            .or(self.workspace.project_dir.as_deref())
            .filter(|dir| !dir.is_empty())
    }

    pub fn model_label(&self) -> Option<&str> {
        self.model
            .display_name
            .as_deref()
            .or(self.model.id.as_deref())
            .filter(|name| !name.is_empty())
    }
}
