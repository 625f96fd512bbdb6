//! Static tool definitions and stdin script construction.
//!
//! Tools are otherwise-interactive CLI programs driven here as one-shot batch
//! invocations: the payload is flattened into the exact sequence of answer
//! lines the tool would read from a terminal, terminated by a blank line
//! meaning "no further repeated input".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("unsupported tool")]
    UnknownTool,
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// One statically configured external tool.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub root: PathBuf,
    pub entrypoint: &'static str,
}

impl ToolDef {
    pub fn command(&self) -> PathBuf {
        self.root.join(self.entrypoint)
    }
}

/// The closed set of tools this deployment can run.
pub fn tool_defs(tools_root: &Path) -> HashMap<String, ToolDef> {
    [
        ToolDef {
            name: "competitive-deep-dive",
            root: tools_root.join("competitive-deep-dive"),
            entrypoint: "run.sh",
        },
        ToolDef {
            name: "protocol-positioning",
            root: tools_root.join("protocol-positioning"),
            entrypoint: "run.sh",
        },
    ]
    .into_iter()
    .map(|def| (def.name.to_string(), def))
    .collect()
}

fn field<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or("").trim()
}

/// Serializes the payload into the tool's expected stdin script. Missing
/// required fields fail here, before any process is spawned.
pub fn build_stdin(tool: &str, payload: &Value) -> Result<String, PayloadError> {
    match tool {
        "competitive-deep-dive" => {
            let competitor = field(payload, "competitor_name");
            if competitor.is_empty() {
                return Err(PayloadError::MissingField("competitor_name"));
            }
            // First answer picks the single-competitor menu entry.
            let lines = [
                "1",
                field(payload, "your_project"),
                competitor,
                field(payload, "competitor_website"),
                field(payload, "competitor_context"),
                "",
            ];
            Ok(lines.join("\n") + "\n")
        }
        "protocol-positioning" => {
            let protocol = field(payload, "your_protocol_name");
            let competitor = field(payload, "competitor_name");
            if protocol.is_empty() {
                return Err(PayloadError::MissingField("your_protocol_name"));
            }
            if competitor.is_empty() {
                return Err(PayloadError::MissingField("competitor_name"));
            }
            let lines = [
                protocol,
                field(payload, "your_protocol_website"),
                field(payload, "your_protocol_context"),
                competitor,
                field(payload, "competitor_website"),
                field(payload, "competitor_context"),
                "",
            ];
            Ok(lines.join("\n") + "\n")
        }
        _ => Err(PayloadError::UnknownTool),
    }
}

/// File-name slug: lower-cased, non-alphanumeric runs collapsed to a single
/// `-`, with a fallback when nothing survives.
pub fn slug(text: &str) -> String {
    let mut out = String::new();
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "project".to_string()
    } else {
        trimmed.to_string()
    }
}
