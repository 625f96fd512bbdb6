//! Job orchestration and the live subprocess pipeline.
//!
//! `run_job` runs on its own tokio task per accepted job. It owns every
//! state transition and never lets a failure escape the task: anything that
//! goes wrong becomes a terminal `failed` state on the job.

use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::artifacts;
use crate::config::Mode;
use crate::demo;
use crate::state::AppState;
use crate::tools::build_stdin;

/// Entry point for the per-job worker task.
pub async fn run_job(state: AppState, job_id: String, payload: Value) {
    state.store.mark_running(&job_id);

    let outcome = match state.config.mode {
        Mode::Demo => demo::run(&state, &job_id, &payload).await,
        Mode::Live => run_live(&state, &job_id, &payload).await,
    };

    match outcome {
        Ok(0) => {
            state.store.finish(&job_id, 0, None);
            info!(job_id = %job_id, "job succeeded");
        }
        Ok(code) => {
            state
                .store
                .finish(&job_id, code, Some(format!("tool exited with code {code}")));
            warn!(job_id = %job_id, code, "job failed");
        }
        Err(err) => {
            state.store.append_log(&job_id, &format!("[error] {err}"));
            state.store.finish(&job_id, -1, Some(err.clone()));
            warn!(job_id = %job_id, error = %err, "job failed");
        }
    }
}

async fn run_live(state: &AppState, job_id: &str, payload: &Value) -> Result<i32, String> {
    let tool = state
        .store
        .tool_of(job_id)
        .ok_or_else(|| "job vanished from store".to_string())?;
    let def = state
        .tools
        .get(&tool)
        .ok_or_else(|| format!("unsupported tool: {tool}"))?;
    if !def.root.is_dir() {
        return Err(format!("tool directory not found: {}", def.root.display()));
    }
    // The handler already validated the payload; re-checked here before
    // anything is spawned.
    let stdin_blob = build_stdin(&tool, payload).map_err(|e| e.to_string())?;

    // stdout and stderr share one pipe so the log preserves the interleaving
    // the tool actually produced.
    let (pipe_read, pipe_write) = nix::unistd::pipe().map_err(|e| format!("pipe: {e}"))?;
    let stderr_write = pipe_write
        .try_clone()
        .map_err(|e| format!("dup pipe: {e}"))?;

    let entrypoint = def.command();
    let mut cmd = Command::new(&entrypoint);
    cmd.current_dir(&def.root)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(pipe_write))
        .stderr(Stdio::from(stderr_write))
        .kill_on_drop(true);

    state.store.append_log(
        job_id,
        &format!("$ {} (cwd={})", entrypoint.display(), def.root.display()),
    );

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("spawn {}: {e}", entrypoint.display()))?;
    // The Command still holds our copies of the pipe write end; close them so
    // the reader sees EOF once the child exits.
    drop(cmd);

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| "child stdin not piped".to_string())?;
    // A tool that exits without draining stdin closes the pipe early; its
    // exit status is the verdict, not this write.
    let _ = stdin.write_all(stdin_blob.as_bytes()).await;
    // One-shot batch invocation: closing stdin ends the interactive script.
    drop(stdin);

    let output = tokio::fs::File::from_std(std::fs::File::from(pipe_read));
    let child_ref = &mut child;
    let stream = async move {
        let mut lines = BufReader::new(output).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| format!("read tool output: {e}"))?
        {
            state.store.append_log(job_id, &line);
            if let Some((label, raw)) = artifacts::parse_marker(&line) {
                if let Some(path) = artifacts::resolve_tool_artifact(&def.root, raw) {
                    state.store.register_artifact(job_id, label, path);
                }
            }
        }
        let status = child_ref
            .wait()
            .await
            .map_err(|e| format!("wait for tool: {e}"))?;
        status
            .code()
            .ok_or_else(|| "tool terminated by signal".to_string())
    };

    match tokio::time::timeout(state.config.job_timeout, stream).await {
        Ok(Ok(code)) => Ok(code),
        Ok(Err(err)) => {
            let _ = child.start_kill();
            Err(err)
        }
        Err(_) => {
            let _ = child.start_kill();
            Err(format!(
                "tool timed out after {}s",
                state.config.job_timeout.as_secs()
            ))
        }
    }
}
