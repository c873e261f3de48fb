//! External tool invocation.
//!
//! Every stage that shells out goes through [`run_tool`], so a nonzero
//! exit always surfaces as the same typed error: tool name, exit status
//! and captured stderr, enough for the operator to reproduce the call.

use std::path::Path;
use std::process::Output;

use tokio::process::Command;

use crate::pipeline::error::{Error, Result};

/// Runs an external tool to completion, capturing output.
///
/// Returns the process output on exit status zero; any nonzero status is
/// [`Error::ToolInvocation`] and a spawn failure is [`Error::ToolSpawn`].
pub async fn run_tool(
    tool: &str,
    args: &[&str],
    cwd: Option<&Path>,
    envs: &[(&str, String)],
) -> Result<Output> {
    log::debug!("running {} {}", tool, args.join(" "));

    let mut command = Command::new(tool);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    for (key, value) in envs {
        command.env(key, value);
    }

    let output = command.output().await.map_err(|e| Error::ToolSpawn {
        tool: tool.to_string(),
        source: e,
    })?;

    if !output.status.success() {
        return Err(Error::ToolInvocation {
            tool: tool.to_string(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output)
}

/// Runs an argv-style command (`["make", "dist"]`) in `cwd`.
pub async fn run_argv(argv: &[String], cwd: &Path, envs: &[(&str, String)]) -> Result<Output> {
    let Some((program, rest)) = argv.split_first() else {
        return Err(Error::Config("empty command".into()));
    };
    let args: Vec<&str> = rest.iter().map(String::as_str).collect();
    run_tool(program, &args, Some(cwd), envs).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nonzero_exit_maps_to_tool_invocation() {
        let err = run_tool("sh", &["-c", "echo oops >&2; exit 7"], None, &[])
            .await
            .expect_err("must fail");
        match err {
            Error::ToolInvocation { tool, status, stderr } => {
                assert_eq!(tool, "sh");
                assert_eq!(status, Some(7));
                assert!(stderr.contains("oops"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_tool_maps_to_spawn_error() {
        let err = run_tool("relkit-no-such-tool", &[], None, &[])
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::ToolSpawn { .. }));
    }

    #[tokio::test]
    async fn empty_argv_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run_argv(&[], dir.path(), &[]).await.expect_err("must fail");
        assert!(matches!(err, Error::Config(_)));
    }
}
