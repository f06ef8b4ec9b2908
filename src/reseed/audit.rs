use crate::reseed::paths::ReseedPaths;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: String,
    pub phase: String,
    pub status: String,
    pub dir: String,
    pub message: String,
}

pub fn audit_log_path(paths: &ReseedPaths) -> PathBuf {
    paths.logs_dir.join("audit.log")
}

pub fn append_event(
    paths: &ReseedPaths,
    phase: &str,
    status: &str,
    dir: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at: chrono::Local::now().to_rfc3339(),
        phase: phase.to_string(),
        status: status.to_string(),
        dir: dir.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = audit_log_path(paths);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
