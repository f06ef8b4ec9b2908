use anyhow::Result;
use std::path::Path;

use crate::commands::CommandReport;
use crate::reseed::local::LocalDirectory;
use crate::reseed::metadata::LoftyMetadataReader;
use crate::reseed::query::build_queries;

pub fn run(dir: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("queries");
    let snapshot = LocalDirectory::scan(dir)?;
    report.detail(format!(
        "dir={} files={} primary={}",
        dir.display(),
        snapshot.files.len(),
        snapshot.primary_content().count()
    ));

    let queries = build_queries(&snapshot, &LoftyMetadataReader);
    if queries.is_empty() {
        report.issue("no primary-content file carries both album and artist tags");
    }
    for query in queries {
        report.detail(format!(
            "album=\"{}\" artist=\"{}\"",
            query.search_term, query.artist_term
        ));
    }
    Ok(report)
}
