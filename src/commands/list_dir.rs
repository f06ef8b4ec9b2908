use anyhow::Result;
use std::path::Path;

use crate::commands::CommandReport;
use crate::reseed::local::LocalDirectory;
use crate::reseed::manifest::{self, ExpectedManifest};

/// Render a local folder as a raw file list, the input `reseed match` takes.
pub fn run(dir: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("list");
    let snapshot = LocalDirectory::scan(dir)?;
    let listed = snapshot
        .files
        .iter()
        .map(|f| (f.relative_path.clone(), f.size))
        .collect::<ExpectedManifest>();

    if listed.is_empty() {
        report.issue(format!("{} contains no files", dir.display()));
        return Ok(report);
    }
    report.detail(manifest::encode(&listed));
    Ok(report)
}
