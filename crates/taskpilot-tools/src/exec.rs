//! Shell and python execution tools.
//!
//! Code variants write the snippet to an ephemeral file and run it;
//! script variants run an on-disk file. Output is combined
//! stdout + stderr, bounded to keep tool-role messages sane.

use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::{decode_args, Tool, ToolError};

const MAX_OUTPUT_BYTES: usize = 64 * 1024;

static PYTHON_EXE: OnceLock<Option<PathBuf>> = OnceLock::new();

fn lookup_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Resolve the python interpreter once per process: `python3`, else
/// `python`, by PATH lookup. The result (including absence) is cached.
pub fn resolve_python() -> Result<PathBuf, ToolError> {
    PYTHON_EXE
        .get_or_init(|| lookup_on_path("python3").or_else(|| lookup_on_path("python")))
        .clone()
        .ok_or(ToolError::MissingInterpreter)
}

fn truncate_output(mut combined: String) -> String {
    if combined.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !combined.is_char_boundary(cut) {
            cut -= 1;
        }
        combined.truncate(cut);
        combined.push_str("... [output truncated]");
    }
    combined
}

/// Run a program and return combined stdout + stderr. A non-zero exit
/// surfaces as an error carrying both streams, matching the contract
/// the LLM recovers from.
async fn run_command(
    program: &std::path::Path,
    args: &[String],
    args_env: Option<&Value>,
) -> Result<String, ToolError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(std::process::Stdio::null());
    cmd.kill_on_drop(true);
    if let Some(value) = args_env {
        cmd.env("ARGS", value.to_string());
    }

    let output = cmd.output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = truncate_output(format!("{}{}", stdout, stderr));

    if !output.status.success() {
        return Err(ToolError::Execution(format!(
            "'{}' exited with {}\n{}",
            program.display(),
            output.status,
            combined
        )));
    }
    Ok(combined)
}

fn shell_path() -> PathBuf {
    PathBuf::from("sh")
}

#[derive(Deserialize)]
struct CodeParams {
    code: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptParams {
    script_path: String,
    #[serde(default)]
    args: Vec<String>,
}

fn code_schema(language: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": {
                "type": "string",
                "description": format!("{} code to execute.", language)
            },
            "args": {
                "type": "object",
                "description": "Optional arguments, exported to the snippet as the ARGS environment variable (JSON-encoded)."
            }
        },
        "required": ["code"]
    })
}

fn script_schema(language: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "scriptPath": {
                "type": "string",
                "description": format!("Path to the {} script to run.", language)
            },
            "args": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Command-line arguments for the script."
            }
        },
        "required": ["scriptPath"]
    })
}

/// Executes an ephemeral shell snippet.
pub struct ShellCodeTool;

#[async_trait]
impl Tool for ShellCodeTool {
    fn name(&self) -> &str {
        "run_shell_code"
    }

    fn description(&self) -> &str {
        "Execute a shell code snippet and return its combined stdout and stderr."
    }

    fn parameters(&self) -> Value {
        code_schema("Shell")
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: CodeParams = decode_args(self.name(), arguments)?;
        let file = tempfile::Builder::new()
            .prefix("taskpilot-")
            .suffix(".sh")
            .tempfile()?;
        tokio::fs::write(file.path(), &params.code).await?;
        run_command(
            &shell_path(),
            &[file.path().to_string_lossy().to_string()],
            params.args.as_ref(),
        )
        .await
    }
}

/// Runs a shell script file.
pub struct ShellScriptTool;

#[async_trait]
impl Tool for ShellScriptTool {
    fn name(&self) -> &str {
        "run_shell_script"
    }

    fn description(&self) -> &str {
        "Run a shell script file with arguments and return its combined stdout and stderr."
    }

    fn parameters(&self) -> Value {
        script_schema("shell")
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: ScriptParams = decode_args(self.name(), arguments)?;
        let mut args = vec![params.script_path];
        args.extend(params.args);
        run_command(&shell_path(), &args, None).await
    }
}

/// Executes an ephemeral python snippet.
pub struct PythonCodeTool;

#[async_trait]
impl Tool for PythonCodeTool {
    fn name(&self) -> &str {
        "run_python_code"
    }

    fn description(&self) -> &str {
        "Execute a Python code snippet and return its combined stdout and stderr."
    }

    fn parameters(&self) -> Value {
        code_schema("Python")
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: CodeParams = decode_args(self.name(), arguments)?;
        let python = resolve_python()?;
        let file = tempfile::Builder::new()
            .prefix("taskpilot-")
            .suffix(".py")
            .tempfile()?;
        tokio::fs::write(file.path(), &params.code).await?;
        run_command(
            &python,
            &[file.path().to_string_lossy().to_string()],
            params.args.as_ref(),
        )
        .await
    }
}

/// Runs a python script file.
pub struct PythonScriptTool;

#[async_trait]
impl Tool for PythonScriptTool {
    fn name(&self) -> &str {
        "run_python_script"
    }

    fn description(&self) -> &str {
        "Run a Python script file with arguments and return its combined stdout and stderr."
    }

    fn parameters(&self) -> Value {
        script_schema("python")
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: ScriptParams = decode_args(self.name(), arguments)?;
        let python = resolve_python()?;
        let mut args = vec![params.script_path];
        args.extend(params.args);
        run_command(&python, &args, None).await
    }
}
