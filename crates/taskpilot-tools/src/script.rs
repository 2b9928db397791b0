//! Dynamic tools for skill-declared scripts.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::exec::{PythonScriptTool, ShellScriptTool};
use crate::{decode_args, Tool, ToolError};

#[derive(Deserialize)]
struct ScriptArgs {
    #[serde(default)]
    args: Vec<String>,
}

/// One synthetic tool per skill-declared script, dispatched to the
/// python or shell runner by file extension.
pub struct SkillScriptTool {
    name: String,
    description: String,
    script_path: PathBuf,
}

impl SkillScriptTool {
    pub fn new(name: impl Into<String>, script_path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let script_path = script_path.into();
        let description = format!(
            "Run the skill script '{}' with optional arguments.",
            script_path.display()
        );
        Self {
            name,
            description,
            script_path,
        }
    }

    fn is_python(&self) -> bool {
        self.script_path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("py"))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Tool for SkillScriptTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "args": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Command-line arguments for the script."
                }
            }
        })
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: ScriptArgs = decode_args(self.name(), arguments)?;
        let forwarded = json!({
            "scriptPath": self.script_path.to_string_lossy(),
            "args": params.args,
        })
        .to_string();
        if self.is_python() {
            PythonScriptTool.invoke(&forwarded).await
        } else {
            ShellScriptTool.invoke(&forwarded).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dispatch() {
        let py = SkillScriptTool::new("convert", "scripts/convert.py");
        assert!(py.is_python());
        let sh = SkillScriptTool::new("deploy", "scripts/deploy.sh");
        assert!(!sh.is_python());
    }

    #[test]
    fn test_runs_shell_script_from_disk() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("greet.sh");
            tokio::fs::write(&script, "echo skill-output \"$1\"")
                .await
                .unwrap();

            let tool = SkillScriptTool::new("greet", &script);
            let out = tool.invoke(r#"{"args":["world"]}"#).await.unwrap();
            assert!(out.contains("skill-output world"));
        });
    }

    #[test]
    fn test_empty_arguments_default() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("noop.sh");
            tokio::fs::write(&script, "echo done").await.unwrap();

            let tool = SkillScriptTool::new("noop", &script);
            let out = tool.invoke("").await.unwrap();
            assert!(out.contains("done"));
        });
    }
}
