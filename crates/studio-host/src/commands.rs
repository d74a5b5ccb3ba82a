//! Line protocol between the host's stdio and the studio.
//!
//! Each input line is one JSON [`StudioCommand`]. Each output line is a JSON
//! object with either a `reply` or an `event` field.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use serde_json::{json, Value};
use tracing::{debug, info};

use studio_engine::CommandReply;
use studio_ipc::{StudioCommand, StudioEvent};

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<StudioCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let command = serde_json::from_str(line).with_context(|| format!("invalid command: {line}"))?;
    Ok(Some(command))
}

/// Render a reply as an output line, saving screenshots under `screenshot_dir`.
pub fn reply_line(reply: &CommandReply, screenshot_dir: &Path) -> anyhow::Result<String> {
    let mut value = serde_json::to_value(reply)?;

    if let CommandReply::Screenshot {
        scene_id,
        source_id,
        image,
        ..
    } = reply
    {
        let path = screenshot_path(screenshot_dir, scene_id, source_id);
        fs::write(&path, image).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), bytes = image.len(), "Screenshot saved");
        if let Value::Object(fields) = &mut value {
            fields.insert("path".into(), json!(path.display().to_string()));
        }
    }

    Ok(value.to_string())
}

/// Render an event as an output line.
pub fn event_line(event: &StudioEvent) -> anyhow::Result<String> {
    Ok(json!({ "event": event }).to_string())
}

/// Render an input error as an output line.
pub fn error_line(err: &anyhow::Error) -> String {
    json!({ "reply": "error", "kind": "invalidArgument", "message": format!("{err:#}") }).to_string()
}

fn screenshot_path(dir: &Path, scene_id: &str, source_id: &str) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let path = dir.join(format!("{scene_id}-{source_id}-{millis}.png"));
    debug!(path = %path.display(), "Screenshot path");
    path
}
