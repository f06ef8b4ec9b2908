use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions of files that carry the distributed media itself. Every
/// manifest entry with one of these must be present locally for a match.
pub const PRIMARY_CONTENT_EXTENSIONS: &[&str] = &["flac", "mp3"];

pub fn is_primary_content(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PRIMARY_CONTENT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Path relative to the directory root, `/`-separated.
    pub relative_path: String,
    pub full_path: PathBuf,
    pub size: u64,
}

/// Snapshot of the regular files under one release folder.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    pub root: PathBuf,
    pub files: Vec<LocalFile>,
}

fn relative_string(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str().map(ToOwned::to_owned))
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

impl LocalDirectory {
    /// Depth-first walk with siblings sorted by name, so the file order is
    /// stable between calls. Symlinks are not followed.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative_path) = relative_string(root, entry.path()) else {
                tracing::debug!(path = %entry.path().display(), "skipping non-UTF-8 path");
                continue;
            };
            let size = entry
                .metadata()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?
                .len();
            files.push(LocalFile {
                relative_path,
                full_path: entry.path().to_path_buf(),
                size,
            });
        }

        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn get(&self, relative_path: &str) -> Option<&LocalFile> {
        self.files.iter().find(|f| f.relative_path == relative_path)
    }

    pub fn primary_content(&self) -> impl Iterator<Item = &LocalFile> {
        self.files
            .iter()
            .filter(|f| is_primary_content(&f.relative_path))
    }
}
