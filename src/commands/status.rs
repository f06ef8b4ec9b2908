use anyhow::Result;
use std::env;
use std::path::Path;

use crate::commands::CommandReport;
use crate::error::ReseedErrorCode;
use crate::reseed::audit::audit_log_path;
use crate::reseed::config::{ENV_OVERRIDES, ReseedConfig, load_unvalidated, validate};
use crate::reseed::lock::RunLock;
use crate::reseed::paths::resolve_paths;

fn overrides_in_effect() -> Vec<&'static str> {
    ENV_OVERRIDES
        .iter()
        .copied()
        .filter(|var| env::var(var).is_ok_and(|v| !v.trim().is_empty()))
        .collect()
}

fn report_config(report: &mut CommandReport, cfg: &ReseedConfig) {
    report.detail(format!(
        "source={} filter={}",
        cfg.source.path, cfg.source.name_filter
    ));
    report.detail(format!("target={} url={}", cfg.target.path, cfg.target.url));
    report.detail(format!(
        "auth={}",
        if cfg.target.api_key.is_some() {
            "api-key"
        } else {
            "login"
        }
    ));
    report.detail(format!(
        "mode={} fuzzy={}",
        cfg.matching.mode, cfg.matching.fuzzy
    ));

    if let Err(err) = validate(cfg) {
        report.issue(format!(
            "{}: {err}",
            ReseedErrorCode::E003ConfigInvalid.as_str()
        ));
        return;
    }

    if !Path::new(&cfg.source.path).is_dir() {
        report.issue(format!(
            "{}: source path {} is not a directory",
            ReseedErrorCode::E004SourceMissing.as_str(),
            cfg.source.path
        ));
    }

    let program = &cfg.registration.program;
    let on_disk = Path::new(program).components().count() > 1 && Path::new(program).is_file();
    match which::which(program) {
        Ok(found) => report.detail(format!("registration_program={}", found.display())),
        Err(_) if on_disk => report.detail(format!("registration_program={program}")),
        Err(_) => report.issue(format!("registration program `{program}` not found on PATH")),
    }
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("reseed_home={}", paths.reseed_home.display()));
    report.detail(format!("config_file={}", paths.config_file.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("audit_log={}", audit_log_path(&paths).display()));

    let overrides = overrides_in_effect();
    if !overrides.is_empty() {
        report.detail(format!("env_overrides={}", overrides.join(",")));
    }

    if paths.reseed_home.is_dir() {
        match RunLock::try_acquire(&paths.lock_file)? {
            Some(lock) => report.detail(format!("lock=free ({})", lock.path().display())),
            None => report.detail(format!(
                "lock=held ({}): a run is in progress",
                ReseedErrorCode::E001Locked.as_str()
            )),
        }
    }

    if !paths.config_file.exists() {
        report.issue(format!(
            "{}: no config at {}; run `reseed init-config`",
            ReseedErrorCode::E002ConfigMissing.as_str(),
            paths.config_file.display()
        ));
        return Ok(report);
    }

    match load_unvalidated(&paths) {
        Ok(cfg) => report_config(&mut report, &cfg),
        Err(err) => report.issue(format!(
            "{}: {err:#}",
            ReseedErrorCode::E003ConfigInvalid.as_str()
        )),
    }

    Ok(report)
}
