use std::path::PathBuf;
use std::process::Stdio;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use spindle_core::error::{Result, SpindleError};

const MAX_CAPTURED_OUTPUT: usize = 30_000;

/// One subprocess invocation: argv, working directory, extra environment.
/// The parent environment is inherited so the child can locate the runner.
#[derive(Debug, Clone)]
pub struct SubprocessRequest {
    /// Item name, for error attribution.
    pub item: String,
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub envs: Vec<(String, String)>,
    pub timeout_secs: u64,
}

#[derive(Debug)]
pub struct SubprocessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn the child and block on its exit. The engine owns the process
/// handle: on cancellation or timeout the child is killed before the error
/// is reported, so no orphan keeps writing into the work directory.
pub async fn run(request: &SubprocessRequest, cancel: &CancellationToken) -> Result<SubprocessOutput> {
    std::fs::create_dir_all(&request.work_dir)?;

    debug!(
        item = %request.item,
        program = %request.program,
        work_dir = %request.work_dir.display(),
        "Spawning subprocess"
    );

    let mut command = tokio::process::Command::new(&request.program);
    command
        .args(&request.args)
        .current_dir(&request.work_dir)
        .envs(request.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let timeout = std::time::Duration::from_secs(request.timeout_secs);
    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(SpindleError::Cancelled),
        result = tokio::time::timeout(timeout, command.output()) => match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(item = %request.item, error = %e, "Subprocess spawn failed");
                return Err(SpindleError::ToolExited {
                    item: request.item.clone(),
                    code: -1,
                });
            }
            Err(_) => {
                debug!(item = %request.item, timeout_secs = request.timeout_secs, "Subprocess timed out");
                return Err(SpindleError::ToolExited {
                    item: request.item.clone(),
                    code: -1,
                });
            }
        },
    };

    let exit_code = output.status.code().unwrap_or(-1);
    Ok(SubprocessOutput {
        exit_code,
        stdout: truncate(String::from_utf8_lossy(&output.stdout).into_owned()),
        stderr: truncate(String::from_utf8_lossy(&output.stderr).into_owned()),
    })
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_CAPTURED_OUTPUT {
        text.truncate(MAX_CAPTURED_OUTPUT);
        text.push_str("\n... (output truncated)");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(program: &str, args: &[&str], work_dir: PathBuf) -> SubprocessRequest {
        SubprocessRequest {
            item: "tool".into(),
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            work_dir,
            envs: vec![],
            timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn test_successful_exit() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(
            &request("sh", &["-c", "echo hello"], dir.path().to_path_buf()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported_not_erred() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(
            &request("sh", &["-c", "exit 3"], dir.path().to_path_buf()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run(&request("sh", &["-c", "sleep 5"], dir.path().to_path_buf()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SpindleError::Cancelled));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request("sh", &["-c", "sleep 30"], dir.path().to_path_buf());
        req.timeout_secs = 1;
        let err = run(&req, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SpindleError::ToolExited { code: -1, .. }));
    }
}
