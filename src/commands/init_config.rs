use anyhow::Result;

use crate::commands::CommandReport;
use crate::reseed::config::write_default_config;
use crate::reseed::paths::resolve_paths;

pub fn run(force: bool) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("init-config");

    if paths.config_file.exists() && !force {
        report.issue(format!(
            "config already exists at {} (pass --force to overwrite)",
            paths.config_file.display()
        ));
        return Ok(report);
    }

    let written = write_default_config(&paths, force)?;
    report.detail(format!("wrote {}", written.display()));
    report.detail("fill in [source], [target] and credentials before `reseed run`");
    Ok(report)
}
