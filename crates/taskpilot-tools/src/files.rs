//! File read/write tools.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{decode_args, Tool, ToolError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadParams {
    file_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteParams {
    file_path: String,
    content: String,
}

/// Returns file contents. Relative paths resolve against the current
/// skill's root when one is set and the resolved file exists.
pub struct ReadFileTool {
    skill_root: Option<PathBuf>,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self { skill_root: None }
    }

    pub fn with_skill_root(root: impl Into<PathBuf>) -> Self {
        Self {
            skill_root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let raw = PathBuf::from(path);
        if raw.is_absolute() {
            return raw;
        }
        if let Some(root) = &self.skill_root {
            let resolved = root.join(&raw);
            if resolved.exists() {
                return resolved;
            }
        }
        raw
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file and return its contents as text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Path to the file. Relative paths resolve against the skill root when available."
                }
            },
            "required": ["filePath"]
        })
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: ReadParams = decode_args(self.name(), arguments)?;
        let path = self.resolve(&params.file_path);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::Execution(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Ok(content)
    }
}

/// Writes a file and returns a confirmation string.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file, creating it if necessary."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Target file path."
                },
                "content": {
                    "type": "string",
                    "description": "Text content to write."
                }
            },
            "required": ["filePath", "content"]
        })
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: WriteParams = decode_args(self.name(), arguments)?;
        if let Some(parent) = PathBuf::from(&params.file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&params.file_path, &params.content)
            .await
            .map_err(|e| {
                ToolError::Execution(format!("failed to write '{}': {}", params.file_path, e))
            })?;
        Ok(format!("Successfully wrote to file: {}", params.file_path))
    }
}
