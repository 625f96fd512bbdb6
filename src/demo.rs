//! Demo-mode simulator: paced log lines and deterministic artifacts, with no
//! subprocess involved. Output files land in the per-job sandbox directory
//! and are registered directly, so no marker parsing is needed.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::sleep;

use crate::state::AppState;
use crate::tools::slug;

/// Primary subject of the request, for log lines and file names.
fn subject(payload: &Value) -> &str {
    ["competitor_name", "your_protocol_name", "your_project"]
        .iter()
        .map(|key| payload.get(key).and_then(Value::as_str).unwrap_or("").trim())
        .find(|s| !s.is_empty())
        .unwrap_or("project")
}

pub async fn run(state: &AppState, job_id: &str, payload: &Value) -> Result<i32, String> {
    let tool = state
        .store
        .tool_of(job_id)
        .ok_or_else(|| "job vanished from store".to_string())?;
    let target = subject(payload).to_string();
    let name_slug = slug(&target);

    let out_dir = state.config.artifact_root.join(job_id);
    tokio::fs::create_dir_all(&out_dir)
        .await
        .map_err(|e| format!("create sandbox dir: {e}"))?;
    let out_dir = tokio::fs::canonicalize(&out_dir)
        .await
        .map_err(|e| format!("resolve sandbox dir: {e}"))?;

    state
        .store
        .append_log(job_id, &format!("[demo] Starting {tool} for {target}..."));
    sleep(Duration::from_millis(800)).await;
    state
        .store
        .append_log(job_id, "[demo] Pulling market and narrative signals...");
    sleep(Duration::from_millis(700)).await;
    state
        .store
        .append_log(job_id, "[demo] Synthesizing executive recommendations...");
    sleep(Duration::from_millis(600)).await;

    if tool == "competitive-deep-dive" {
        let md_path = out_dir.join(format!("deep_dive_{name_slug}.md"));
        let json_path = out_dir.join(format!("deep_dive_{name_slug}.json"));
        let md = format!(
            "# Demo Competitive Deep-Dive: {target}\n\
             \n\
             ## Executive Snapshot\n\
             - Market momentum: Positive\n\
             - Narrative threat: Medium\n\
             - Recommended move: Clarify differentiated positioning in a 2-week sprint\n\
             \n\
             ## Suggested Campaign Angle\n\
             \"Own the execution narrative with proof-backed data stories.\"\n"
        );
        tokio::fs::write(&md_path, md)
            .await
            .map_err(|e| format!("write {}: {e}", md_path.display()))?;

        let data = json!({
            "mode": "demo",
            "tool": tool,
            "target": target,
            "summary": {
                "threat_level": "medium",
                "priority_move": "Double down on data-backed messaging",
            },
        });
        let body =
            serde_json::to_string_pretty(&data).map_err(|e| format!("encode research data: {e}"))?;
        tokio::fs::write(&json_path, body)
            .await
            .map_err(|e| format!("write {}: {e}", json_path.display()))?;

        state.store.register_artifact(job_id, "Markdown", md_path);
        state
            .store
            .register_artifact(job_id, "Research JSON", json_path);
    } else {
        let md_path = out_dir.join(format!("positioning_{name_slug}.md"));
        let csv_path = out_dir.join(format!("positioning_{name_slug}.csv"));
        let md = format!(
            "# Demo Protocol Positioning: {target}\n\
             \n\
             ## Positioning Matrix Summary\n\
             - Strength: Narrative clarity\n\
             - Weakness: Distribution dependence\n\
             - Opportunity: Partnership-led onboarding funnels\n\
             - Threat: Faster-moving exchange narratives\n"
        );
        tokio::fs::write(&md_path, md)
            .await
            .map_err(|e| format!("write {}: {e}", md_path.display()))?;

        let csv = "factor,your_protocol,competitor,advantage\n\
                   narrative_clarity,8,7,your_protocol\n\
                   growth_velocity,7,8,competitor\n\
                   community_quality,8,7,your_protocol\n";
        tokio::fs::write(&csv_path, csv)
            .await
            .map_err(|e| format!("write {}: {e}", csv_path.display()))?;

        state.store.register_artifact(job_id, "Markdown", md_path);
        state.store.register_artifact(job_id, "Matrix CSV", csv_path);
    }

    state.store.append_log(job_id, "[demo] Completed successfully.");
    Ok(0)
}
