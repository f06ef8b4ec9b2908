use crate::error::{ReseedError, ReseedErrorCode};
use crate::reseed::catalog::{CandidateId, CatalogClient};
use crate::reseed::local::LocalDirectory;
use crate::reseed::manifest;
use crate::reseed::metadata::MetadataReader;
use crate::reseed::migrate::{self, MigrationMode, MigrationOutcome};
use crate::reseed::query::build_queries;
use crate::reseed::reconcile::{MatchOptions, MatchResult, RenameMap, reconcile};
use crate::reseed::registration::RegistrationSink;
use crate::reseed::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub mode: MigrationMode,
    pub matching: MatchOptions,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundMatch {
    pub descriptor_id: CandidateId,
    pub file_path: String,
    pub rename_map: RenameMap,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DirectoryOutcome {
    Reseeded {
        descriptor_id: CandidateId,
        target: PathBuf,
        renamed_files: usize,
        registered: bool,
    },
    NoMatch {
        queries: usize,
        candidates: usize,
    },
    Failed {
        reason: String,
    },
}

impl DirectoryOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            DirectoryOutcome::Reseeded { .. } => "reseeded",
            DirectoryOutcome::NoMatch { .. } => "no-match",
            DirectoryOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryReport {
    pub dir: PathBuf,
    #[serde(flatten)]
    pub outcome: DirectoryOutcome,
}

/// Immediate subdirectories of `root` whose name contains `name_filter`
/// (case-insensitive), sorted by name.
pub fn find_source_dirs(root: &Path, name_filter: &str) -> Result<Vec<PathBuf>> {
    let needle = name_filter.to_lowercase();
    let mut out = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().to_lowercase().contains(&needle) {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// Join a catalog folder name onto the target root, refusing names that
/// would land outside it.
pub fn resolve_target(target_root: &Path, file_path: &str) -> Result<PathBuf, ReseedError> {
    let rel = Path::new(file_path);
    let ok = !file_path.trim().is_empty()
        && rel.components().all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(target_root.join(rel))
    } else {
        Err(ReseedError::fs(
            "resolve-target",
            rel,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "catalog folder name escapes the target root",
            ),
        ))
    }
}

/// Result of searching the catalog for one folder.
#[derive(Debug, Clone, Default)]
pub struct MatchSearch {
    pub found: Option<FoundMatch>,
    pub queries: usize,
    /// Distinct candidates fetched before a match (or exhaustion).
    pub candidates: usize,
}

fn warn_candidate(dir: &Path, id: CandidateId, code: &str, stage: &str, err: &str) {
    warn::emit(WarnEvent {
        code,
        stage,
        dir: &dir.display().to_string(),
        candidate: &id.to_string(),
        reason: "skip-candidate",
        err,
    });
}

/// Walk the folder's queries and their candidates in catalog order and stop
/// at the first release whose manifest the folder satisfies. Candidate-level
/// failures are warned and skipped.
pub fn find_match(
    dir: &Path,
    catalog: &dyn CatalogClient,
    reader: &dyn MetadataReader,
    opts: &MatchOptions,
) -> Result<MatchSearch> {
    let snapshot = LocalDirectory::scan(dir)?;
    let queries = build_queries(&snapshot, reader);
    let mut seen = BTreeSet::new();
    let mut out = MatchSearch {
        queries: queries.len(),
        ..MatchSearch::default()
    };

    for query in &queries {
        tracing::info!(album = %query.search_term, artist = %query.artist_term, "searching catalog");
        let ids = match catalog.search(query) {
            Ok(ids) => ids,
            Err(err) => {
                warn::emit(WarnEvent {
                    code: "SEARCH_FAILED",
                    stage: "search",
                    dir: &dir.display().to_string(),
                    candidate: &query.search_term,
                    reason: "skip-query",
                    err: &format!("{err:#}"),
                });
                continue;
            }
        };

        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            out.candidates += 1;

            let descriptor = match catalog.fetch_manifest(id) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    warn_candidate(dir, id, "FETCH_FAILED", "fetch", &format!("{err:#}"));
                    continue;
                }
            };
            let expected = match manifest::parse(&descriptor.file_list_raw) {
                Ok(expected) => expected,
                Err(err) => {
                    warn_candidate(dir, id, "MANIFEST_MALFORMED", "parse", &err.to_string());
                    continue;
                }
            };
            match reconcile(dir, &expected, opts)? {
                MatchResult::Match(rename_map) => {
                    tracing::info!(
                        candidate = id,
                        file_path = %descriptor.file_path,
                        renames = rename_map.renames().count(),
                        "candidate matches"
                    );
                    out.found = Some(FoundMatch {
                        descriptor_id: descriptor.id,
                        file_path: descriptor.file_path,
                        rename_map,
                    });
                    return Ok(out);
                }
                MatchResult::NoMatch => {
                    tracing::debug!(candidate = id, "candidate does not match");
                }
            }
        }
    }

    Ok(out)
}

fn register(
    found: &FoundMatch,
    catalog: &dyn CatalogClient,
    sink: &dyn RegistrationSink,
    dir: &Path,
) -> bool {
    let descriptor = match catalog.download_descriptor(found.descriptor_id) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn_candidate(
                dir,
                found.descriptor_id,
                "DOWNLOAD_FAILED",
                "register",
                &format!("{err:#}"),
            );
            return false;
        }
    };
    match sink.register(&descriptor) {
        Ok(()) => true,
        Err(err) => {
            warn_candidate(
                dir,
                found.descriptor_id,
                "REGISTRATION_FAILED",
                "register",
                &err.to_string(),
            );
            false
        }
    }
}

/// Match, migrate and register one source folder. Never returns an error:
/// every failure is folded into the outcome so the caller can move on.
pub fn process_directory(
    dir: &Path,
    target_root: &Path,
    catalog: &dyn CatalogClient,
    reader: &dyn MetadataReader,
    sink: &dyn RegistrationSink,
    opts: &PipelineOptions,
) -> DirectoryOutcome {
    tracing::info!(dir = %dir.display(), "processing");

    let search = match find_match(dir, catalog, reader, &opts.matching) {
        Ok(search) => search,
        Err(err) => {
            return DirectoryOutcome::Failed {
                reason: format!("{err:#}"),
            };
        }
    };
    let Some(found) = search.found else {
        tracing::info!(
            dir = %dir.display(),
            queries = search.queries,
            candidates = search.candidates,
            "no matching release"
        );
        return DirectoryOutcome::NoMatch {
            queries: search.queries,
            candidates: search.candidates,
        };
    };

    let target = match resolve_target(target_root, &found.file_path) {
        Ok(target) => target,
        Err(err) => {
            return DirectoryOutcome::Failed {
                reason: format!("{}: {err}", ReseedErrorCode::E005TargetEscape.as_str()),
            };
        }
    };

    let migration: MigrationOutcome =
        match migrate::migrate(opts.mode, dir, &target, &found.rename_map, opts.dry_run) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(dir = %dir.display(), "migration failed: {err}");
                return DirectoryOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };
    tracing::debug!(operations = migration.operations.len(), "migration applied");

    let registered = if opts.dry_run {
        tracing::info!(
            candidate = found.descriptor_id,
            "dry-run: skipping torrent download and registration"
        );
        false
    } else {
        register(&found, catalog, sink, dir)
    };

    DirectoryOutcome::Reseeded {
        descriptor_id: found.descriptor_id,
        target,
        renamed_files: found.rename_map.renames().count(),
        registered,
    }
}

/// Process each folder in order; one folder's failure never stops the rest.
pub fn run(
    dirs: &[PathBuf],
    target_root: &Path,
    catalog: &dyn CatalogClient,
    reader: &dyn MetadataReader,
    sink: &dyn RegistrationSink,
    opts: &PipelineOptions,
    mut on_report: impl FnMut(&DirectoryReport),
) -> Vec<DirectoryReport> {
    let mut reports = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let outcome = process_directory(dir, target_root, catalog, reader, sink, opts);
        let report = DirectoryReport {
            dir: dir.clone(),
            outcome,
        };
        on_report(&report);
        reports.push(report);
    }
    reports
}
