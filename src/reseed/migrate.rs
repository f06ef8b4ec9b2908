use crate::error::ReseedError;
use crate::reseed::reconcile::RenameMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

const STAGING_DIR: &str = ".reseed-staging";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    /// Relocate the folder (destructive).
    #[default]
    Move,
    /// Build a symlink view and leave the folder in place (cross-seeding).
    Link,
}

impl MigrationMode {
    pub fn label(self) -> &'static str {
        match self {
            MigrationMode::Move => "move",
            MigrationMode::Link => "link",
        }
    }
}

impl fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MigrationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "move" | "mv" => Ok(MigrationMode::Move),
            "link" | "symlink" | "ln" => Ok(MigrationMode::Link),
            other => Err(format!("unknown migration mode `{other}`; use `move` or `link`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationOp {
    CreateDir { path: PathBuf },
    Rename { from: PathBuf, to: PathBuf },
    Copy { from: PathBuf, to: PathBuf },
    Symlink { target: PathBuf, link: PathBuf },
    RemoveDir { path: PathBuf },
}

impl fmt::Display for MigrationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOp::CreateDir { path } => write!(f, "$ mkdir -p \"{}\"", path.display()),
            MigrationOp::Rename { from, to } => {
                write!(f, "$ mv \"{}\" \"{}\"", from.display(), to.display())
            }
            MigrationOp::Copy { from, to } => {
                write!(f, "$ cp \"{}\" \"{}\"", from.display(), to.display())
            }
            MigrationOp::Symlink { target, link } => {
                write!(f, "$ ln -s \"{}\" \"{}\"", target.display(), link.display())
            }
            MigrationOp::RemoveDir { path } => write!(f, "$ rmdir \"{}\"", path.display()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    pub mode: MigrationMode,
    pub dry_run: bool,
    pub operations: Vec<MigrationOp>,
}

/// Records every operation and performs it unless this is a dry run.
struct Executor {
    dry_run: bool,
    operations: Vec<MigrationOp>,
    planned_dirs: BTreeSet<PathBuf>,
}

impl Executor {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            operations: Vec::new(),
            planned_dirs: BTreeSet::new(),
        }
    }

    fn apply(&mut self, op: MigrationOp) -> Result<(), ReseedError> {
        if self.dry_run {
            tracing::info!("dry-run {op}");
        } else {
            tracing::info!("{op}");
            perform(&op)?;
        }
        self.operations.push(op);
        Ok(())
    }

    fn create_dir(&mut self, path: &Path) -> Result<(), ReseedError> {
        if path.is_dir() || self.planned_dirs.contains(path) {
            return Ok(());
        }
        self.planned_dirs.insert(path.to_path_buf());
        self.apply(MigrationOp::CreateDir {
            path: path.to_path_buf(),
        })
    }

    fn ensure_parent(&mut self, path: &Path) -> Result<(), ReseedError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.create_dir(parent),
            _ => Ok(()),
        }
    }
}

fn perform(op: &MigrationOp) -> Result<(), ReseedError> {
    match op {
        MigrationOp::CreateDir { path } => {
            fs::create_dir_all(path).map_err(|e| ReseedError::fs("mkdir", path, e))
        }
        MigrationOp::Rename { from, to } => {
            fs::rename(from, to).map_err(|e| ReseedError::fs("rename", from, e))
        }
        MigrationOp::Copy { from, to } => fs::copy(from, to)
            .map(|_| ())
            .map_err(|e| ReseedError::fs("copy", from, e)),
        MigrationOp::Symlink { target, link } => {
            make_symlink(target, link).map_err(|e| ReseedError::fs("symlink", link, e))
        }
        MigrationOp::RemoveDir { path } => {
            fs::remove_dir(path).map_err(|e| ReseedError::fs("rmdir", path, e))
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "symlinks are only supported on unix targets",
    ))
}

/// Rejects absolute paths and `..` so catalog-supplied names stay inside
/// the destination.
fn checked_relative(path: &str) -> Result<&Path, ReseedError> {
    let candidate = Path::new(path);
    let normal = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if normal {
        Ok(candidate)
    } else {
        Err(ReseedError::fs(
            "validate",
            candidate,
            io::Error::new(ErrorKind::InvalidInput, "path escapes its root"),
        ))
    }
}

fn ensure_absent(dst: &Path) -> Result<(), ReseedError> {
    match fs::symlink_metadata(dst) {
        Ok(_) => Err(ReseedError::fs(
            "create",
            dst,
            io::Error::new(ErrorKind::AlreadyExists, "destination already exists"),
        )),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ReseedError::fs("stat", dst, err)),
    }
}

fn ensure_source_dir(src: &Path) -> Result<(), ReseedError> {
    let meta = fs::metadata(src).map_err(|e| ReseedError::fs("stat", src, e))?;
    if meta.is_dir() {
        Ok(())
    } else {
        Err(ReseedError::fs(
            "stat",
            src,
            io::Error::new(ErrorKind::InvalidInput, "source is not a directory"),
        ))
    }
}

/// Actual path -> every expected path it must end up at, for actual files
/// that take part in at least one rename.
fn rename_groups(map: &RenameMap) -> BTreeMap<&str, Vec<&str>> {
    let renamed = map.renames().map(|(_, actual)| actual).collect::<BTreeSet<_>>();
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (expected, actual) in map.iter() {
        if renamed.contains(actual) {
            groups.entry(actual).or_default().push(expected);
        }
    }
    groups
}

fn fix_up_renames(
    exec: &mut Executor,
    dst: &Path,
    map: &RenameMap,
) -> Result<(), ReseedError> {
    let groups = rename_groups(map);
    if groups.is_empty() {
        return Ok(());
    }

    // A target that is also the source of another group would be clobbered
    // before it is moved; park every source first in that case.
    let conflicted = groups.iter().any(|(actual, targets)| {
        targets
            .iter()
            .any(|t| t != actual && groups.contains_key(t))
    });

    let staging = dst.join(STAGING_DIR);
    let mut sources = BTreeMap::new();
    for (index, actual) in groups.keys().enumerate() {
        let current = dst.join(checked_relative(actual)?);
        if conflicted {
            let parked = staging.join(index.to_string());
            exec.create_dir(&staging)?;
            exec.apply(MigrationOp::Rename {
                from: current,
                to: parked.clone(),
            })?;
            sources.insert(*actual, parked);
        } else {
            sources.insert(*actual, current);
        }
    }

    for (actual, targets) in &groups {
        let from = &sources[actual];
        let keep_in_place = !conflicted && targets.contains(actual);
        let moved = targets
            .iter()
            .filter(|t| !(keep_in_place && *t == actual))
            .collect::<Vec<_>>();

        for (i, expected) in moved.iter().enumerate() {
            let to = dst.join(checked_relative(expected)?);
            exec.ensure_parent(&to)?;
            let last = i + 1 == moved.len();
            if last && !keep_in_place {
                exec.apply(MigrationOp::Rename {
                    from: from.clone(),
                    to,
                })?;
            } else {
                exec.apply(MigrationOp::Copy {
                    from: from.clone(),
                    to,
                })?;
            }
        }
    }

    if conflicted {
        exec.apply(MigrationOp::RemoveDir { path: staging })?;
    }
    Ok(())
}

fn migrate_move(
    exec: &mut Executor,
    src: &Path,
    dst: &Path,
    map: &RenameMap,
) -> Result<(), ReseedError> {
    exec.ensure_parent(dst)?;
    exec.apply(MigrationOp::Rename {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
    })?;
    exec.planned_dirs.insert(dst.to_path_buf());
    fix_up_renames(exec, dst, map)
}

fn migrate_link(
    exec: &mut Executor,
    src: &Path,
    dst: &Path,
    map: &RenameMap,
) -> Result<(), ReseedError> {
    let abs_src = fs::canonicalize(src).map_err(|e| ReseedError::fs("canonicalize", src, e))?;

    if !map.has_renames() {
        exec.ensure_parent(dst)?;
        return exec.apply(MigrationOp::Symlink {
            target: abs_src,
            link: dst.to_path_buf(),
        });
    }

    exec.create_dir(dst)?;
    for (expected, actual) in map.iter() {
        let link = dst.join(checked_relative(expected)?);
        let target = abs_src.join(checked_relative(actual)?);
        exec.ensure_parent(&link)?;
        exec.apply(MigrationOp::Symlink { target, link })?;
    }
    Ok(())
}

/// Make `dst` present the content of `src` under the expected names.
///
/// Move mode renames the folder and then fixes up renamed files; Link mode
/// leaves `src` untouched and symlinks into it. Nothing is rolled back if an
/// operation fails part way.
pub fn migrate(
    mode: MigrationMode,
    src: &Path,
    dst: &Path,
    map: &RenameMap,
    dry_run: bool,
) -> Result<MigrationOutcome, ReseedError> {
    ensure_source_dir(src)?;
    ensure_absent(dst)?;
    for (expected, actual) in map.iter() {
        checked_relative(expected)?;
        checked_relative(actual)?;
    }

    let mut exec = Executor::new(dry_run);
    match mode {
        MigrationMode::Move => migrate_move(&mut exec, src, dst, map)?,
        MigrationMode::Link => migrate_link(&mut exec, src, dst, map)?,
    }

    Ok(MigrationOutcome {
        mode,
        dry_run,
        operations: exec.operations,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, body: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, body).expect("write");
    }

    fn map(entries: &[(&str, &str)]) -> RenameMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn move_relocates_folder_and_renames_files() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("old/Album [FLAC]");
        let dst = tmp.path().join("new/Artist - Album");
        write(&src.join("x.flac"), "track one");
        write(&src.join("cover.jpg"), "art");

        let out = migrate(
            MigrationMode::Move,
            &src,
            &dst,
            &map(&[("a.flac", "x.flac"), ("cover.jpg", "cover.jpg")]),
            false,
        )
        .expect("migrate");

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(dst.join("a.flac")).expect("read"), "track one");
        assert!(!dst.join("x.flac").exists());
        assert!(dst.join("cover.jpg").is_file());
        assert!(out.operations.iter().any(|op| matches!(op, MigrationOp::Rename { .. })));
    }

    #[test]
    fn move_creates_nested_target_directories() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("loose.flac"), "1");

        migrate(
            MigrationMode::Move,
            &src,
            &dst,
            &map(&[("CD1/01.flac", "loose.flac")]),
            false,
        )
        .expect("migrate");
        assert_eq!(fs::read_to_string(dst.join("CD1/01.flac")).expect("read"), "1");
    }

    #[test]
    fn move_handles_swapped_names() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("a.flac"), "content-a");
        write(&src.join("b.flac"), "content-b");

        migrate(
            MigrationMode::Move,
            &src,
            &dst,
            &map(&[("a.flac", "b.flac"), ("b.flac", "a.flac")]),
            false,
        )
        .expect("migrate");
        assert_eq!(fs::read_to_string(dst.join("a.flac")).expect("read"), "content-b");
        assert_eq!(fs::read_to_string(dst.join("b.flac")).expect("read"), "content-a");
        assert!(!dst.join(STAGING_DIR).exists());
    }

    #[test]
    fn move_copies_when_one_file_serves_two_entries() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("only.flac"), "same");

        migrate(
            MigrationMode::Move,
            &src,
            &dst,
            &map(&[("01.flac", "only.flac"), ("02.flac", "only.flac")]),
            false,
        )
        .expect("migrate");
        assert_eq!(fs::read_to_string(dst.join("01.flac")).expect("read"), "same");
        assert_eq!(fs::read_to_string(dst.join("02.flac")).expect("read"), "same");
        assert!(!dst.join("only.flac").exists());
    }

    #[test]
    fn link_without_renames_is_a_single_directory_symlink() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("links/dst");
        write(&src.join("01.flac"), "1");

        let out = migrate(
            MigrationMode::Link,
            &src,
            &dst,
            &map(&[("01.flac", "01.flac")]),
            false,
        )
        .expect("migrate");

        let meta = fs::symlink_metadata(&dst).expect("lstat");
        assert!(meta.file_type().is_symlink());
        assert_eq!(
            fs::read_link(&dst).expect("readlink"),
            fs::canonicalize(&src).expect("canon")
        );
        assert!(fs::symlink_metadata(&src).expect("lstat src").is_dir());
        assert!(src.join("01.flac").is_file());
        assert_eq!(
            out.operations
                .iter()
                .filter(|op| matches!(op, MigrationOp::Symlink { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn link_with_renames_builds_a_per_file_symlink_farm() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("track1.flac"), "t1");
        write(&src.join("art/cover.jpg"), "img");

        migrate(
            MigrationMode::Link,
            &src,
            &dst,
            &map(&[("CD1/01 Intro.flac", "track1.flac"), ("cover.jpg", "art/cover.jpg")]),
            false,
        )
        .expect("migrate");

        assert!(fs::symlink_metadata(&dst).expect("lstat").is_dir());
        let link = dst.join("CD1/01 Intro.flac");
        assert!(fs::symlink_metadata(&link).expect("lstat").file_type().is_symlink());
        assert_eq!(fs::read_to_string(&link).expect("read"), "t1");
        assert_eq!(fs::read_to_string(dst.join("cover.jpg")).expect("read"), "img");
        assert!(src.join("track1.flac").is_file());
    }

    #[test]
    fn dry_run_plans_without_touching_disk() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("deep/dst");
        write(&src.join("x.flac"), "x");

        let out = migrate(
            MigrationMode::Move,
            &src,
            &dst,
            &map(&[("a.flac", "x.flac")]),
            true,
        )
        .expect("migrate");

        assert!(out.dry_run);
        assert!(src.join("x.flac").is_file());
        assert!(!tmp.path().join("deep").exists());
        let rendered = out.operations.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert!(rendered[0].starts_with("$ mkdir -p"));
        assert!(rendered.iter().any(|line| line.ends_with("a.flac\"")));
    }

    #[test]
    fn existing_destination_is_refused() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("x.flac"), "x");
        fs::create_dir_all(&dst).expect("mkdir dst");

        let err = migrate(MigrationMode::Move, &src, &dst, &RenameMap::new(), false)
            .expect_err("dst exists");
        assert!(matches!(err, ReseedError::Filesystem { .. }));
        assert!(src.join("x.flac").is_file());
    }

    #[test]
    fn escaping_manifest_paths_are_refused() {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("x.flac"), "x");

        for bad in ["../evil.flac", "/etc/evil.flac", ""] {
            let result = migrate(
                MigrationMode::Link,
                &src,
                &dst,
                &map(&[(bad, "x.flac")]),
                false,
            );
            assert!(result.is_err(), "{bad} should be rejected");
        }
        assert!(!dst.exists());
    }

    #[test]
    fn mode_parses_from_text() {
        assert_eq!("link".parse::<MigrationMode>(), Ok(MigrationMode::Link));
        assert_eq!(" MOVE ".parse::<MigrationMode>(), Ok(MigrationMode::Move));
        assert!("copy".parse::<MigrationMode>().is_err());
    }
}
