//! Decide whether a local release folder holds the content a manifest
//! describes, and where each expected file lives locally.
//!
//! Each manifest entry is resolved by the first tier that finds a file:
//!
//! 1. the file at exactly the expected path, with exactly the expected size;
//! 2. any file in the tree with exactly the expected size;
//! 3. (opt-in) a file with the same leading track number and extension whose
//!    size is within 5% of the expected size.
//!
//! A primary-content entry that no tier resolves rejects the whole folder.
//! Supporting files (artwork, logs, cue sheets) are optional.

use crate::reseed::local::{LocalDirectory, LocalFile, is_primary_content};
use crate::reseed::manifest::ExpectedManifest;
use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Percentage by which a fuzzy candidate's size may differ from the expected
/// size, relative to the smaller of the two.
pub const FUZZY_SIZE_TOLERANCE_PERCENT: u64 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Enable the prefix/suffix/near-size tier.
    pub fuzzy: bool,
}

/// Expected relative path -> actual relative path inside the local folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RenameMap(BTreeMap<String, String>);

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, expected: impl Into<String>, actual: impl Into<String>) {
        self.0.insert(expected.into(), actual.into());
    }

    pub fn get(&self, expected: &str) -> Option<&str> {
        self.0.get(expected).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries whose local path differs from the expected one.
    pub fn renames(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(expected, actual)| expected != actual)
    }

    pub fn has_renames(&self) -> bool {
        self.renames().next().is_some()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RenameMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    Match(RenameMap),
}

impl MatchResult {
    pub fn into_rename_map(self) -> Option<RenameMap> {
        match self {
            MatchResult::Match(map) => Some(map),
            MatchResult::NoMatch => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    DirectPath,
    ExactSize,
    Fuzzy,
}

impl Tier {
    fn label(self) -> &'static str {
        match self {
            Tier::DirectPath => "direct-path",
            Tier::ExactSize => "exact-size",
            Tier::Fuzzy => "fuzzy",
        }
    }
}

/// `(leading digits, lowercase extension)` of a file's base name.
fn name_signature(path: &str) -> (String, Option<String>) {
    let name = path.rsplit('/').next().unwrap_or(path);
    let prefix = name
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    let suffix = name.rfind('.').map(|pos| name[pos + 1..].to_lowercase());
    (prefix, suffix)
}

/// Sizes within [`FUZZY_SIZE_TOLERANCE_PERCENT`] of the smaller one; a zero
/// size only matches zero.
pub fn sizes_are_close(a: u64, b: u64) -> bool {
    if a == 0 || b == 0 {
        return a == b;
    }
    let diff = u128::from(a.abs_diff(b));
    let smaller = u128::from(a.min(b));
    diff * 100 < smaller * u128::from(FUZZY_SIZE_TOLERANCE_PERCENT)
}

struct Resolver<'a> {
    dir: &'a LocalDirectory,
    opts: MatchOptions,
    /// Local paths that are a direct-path hit for some manifest entry. Other
    /// entries avoid taking them by size alone.
    reserved: BTreeSet<&'a str>,
    claimed: BTreeSet<&'a str>,
}

impl<'a> Resolver<'a> {
    fn new(dir: &'a LocalDirectory, manifest: &ExpectedManifest, opts: MatchOptions) -> Self {
        let reserved = dir
            .files
            .iter()
            .filter(|f| manifest.get(&f.relative_path) == Some(&f.size))
            .map(|f| f.relative_path.as_str())
            .collect();
        Self {
            dir,
            opts,
            reserved,
            claimed: BTreeSet::new(),
        }
    }

    fn is_free(&self, file: &LocalFile) -> bool {
        let path = file.relative_path.as_str();
        !self.claimed.contains(path) && !self.reserved.contains(path)
    }

    fn direct_path(&self, expected: &str, size: u64) -> Option<&'a LocalFile> {
        self.dir.get(expected).filter(|f| f.size == size)
    }

    fn exact_size(&self, size: u64) -> Option<&'a LocalFile> {
        let mut same_size = self.dir.files.iter().filter(|f| f.size == size);
        let first = same_size.next()?;
        if self.is_free(first) {
            return Some(first);
        }
        same_size.find(|f| self.is_free(f)).or(Some(first))
    }

    fn fuzzy(&self, expected: &str, size: u64) -> Option<&'a LocalFile> {
        let wanted = name_signature(expected);
        self.dir.files.iter().find(|f| {
            self.is_free(f)
                && name_signature(&f.relative_path) == wanted
                && sizes_are_close(f.size, size)
        })
    }

    fn resolve(&mut self, expected: &str, size: u64) -> Option<(&'a LocalFile, Tier)> {
        let found = self
            .direct_path(expected, size)
            .map(|f| (f, Tier::DirectPath))
            .or_else(|| self.exact_size(size).map(|f| (f, Tier::ExactSize)))
            .or_else(|| {
                if self.opts.fuzzy {
                    self.fuzzy(expected, size).map(|f| (f, Tier::Fuzzy))
                } else {
                    None
                }
            })?;
        self.claimed.insert(found.0.relative_path.as_str());
        Some(found)
    }
}

/// Match an already-scanned folder against one manifest.
pub fn reconcile_snapshot(
    dir: &LocalDirectory,
    manifest: &ExpectedManifest,
    opts: &MatchOptions,
) -> MatchResult {
    let mut resolver = Resolver::new(dir, manifest, *opts);
    let mut map = RenameMap::new();

    for (expected, &size) in manifest {
        match resolver.resolve(expected, size) {
            Some((file, tier)) => {
                tracing::debug!(
                    tier = tier.label(),
                    expected = %expected,
                    actual = %file.relative_path,
                    "resolved manifest entry"
                );
                map.insert(expected.as_str(), file.relative_path.as_str());
            }
            None if is_primary_content(expected) => {
                tracing::warn!(
                    dir = %dir.root.display(),
                    missing = %expected,
                    size,
                    "discarding candidate: no local file for required entry"
                );
                return MatchResult::NoMatch;
            }
            None => {
                tracing::debug!(expected = %expected, "optional file missing locally");
            }
        }
    }

    if map.is_empty() {
        tracing::warn!(
            dir = %dir.root.display(),
            entries = manifest.len(),
            "discarding candidate: no listed file is present locally"
        );
        return MatchResult::NoMatch;
    }

    MatchResult::Match(map)
}

/// Scan `root` and match it against `manifest`.
pub fn reconcile(
    root: &Path,
    manifest: &ExpectedManifest,
    opts: &MatchOptions,
) -> Result<MatchResult> {
    let dir = LocalDirectory::scan(root)?;
    Ok(reconcile_snapshot(&dir, manifest, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn folder(files: &[(&str, usize)]) -> TempDir {
        let tmp = tempdir().expect("tempdir");
        for (name, size) in files {
            let path = tmp.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("mkdir");
            }
            fs::write(&path, vec![b'x'; *size]).expect("write");
        }
        tmp
    }

    fn manifest(entries: &[(&str, u64)]) -> ExpectedManifest {
        entries
            .iter()
            .map(|(name, size)| (name.to_string(), *size))
            .collect()
    }

    fn strict() -> MatchOptions {
        MatchOptions::default()
    }

    fn fuzzy() -> MatchOptions {
        MatchOptions { fuzzy: true }
    }

    #[test]
    fn identical_layout_matches_without_renames() {
        let tmp = folder(&[("01 Intro.flac", 100), ("cover.jpg", 20), ("CD2/01.flac", 50)]);
        let m = manifest(&[("01 Intro.flac", 100), ("cover.jpg", 20), ("CD2/01.flac", 50)]);
        let got = reconcile(tmp.path(), &m, &strict()).expect("reconcile");
        let MatchResult::Match(map) = got else {
            panic!("expected a match");
        };
        assert_eq!(map.len(), 3);
        assert!(!map.has_renames());
    }

    #[test]
    fn renamed_track_is_found_by_size_and_missing_artwork_is_tolerated() {
        let tmp = folder(&[("track1.flac", 1000)]);
        let m = manifest(&[("01 Intro.flac", 1000), ("cover.jpg", 2000)]);
        let got = reconcile(tmp.path(), &m, &strict()).expect("reconcile");
        let want: RenameMap = [("01 Intro.flac", "track1.flac")].into_iter().collect();
        assert_eq!(got, MatchResult::Match(want));
    }

    #[test]
    fn required_track_without_same_size_file_is_no_match() {
        let tmp = folder(&[("01 Intro.flac", 900)]);
        let m = manifest(&[("01 Intro.flac", 1000)]);
        assert_eq!(
            reconcile(tmp.path(), &m, &strict()).expect("reconcile"),
            MatchResult::NoMatch
        );
    }

    #[test]
    fn mp3_entries_are_required_too() {
        let tmp = folder(&[("cover.jpg", 5)]);
        let m = manifest(&[("cover.jpg", 5), ("01.MP3", 10)]);
        assert_eq!(
            reconcile(tmp.path(), &m, &strict()).expect("reconcile"),
            MatchResult::NoMatch
        );
    }

    #[test]
    fn direct_path_with_wrong_size_falls_through_to_size_scan() {
        let tmp = folder(&[("01.flac", 10), ("other/renamed.flac", 12)]);
        let m = manifest(&[("01.flac", 12)]);
        let got = reconcile(tmp.path(), &m, &strict()).expect("reconcile");
        let map = got.into_rename_map().expect("match");
        assert_eq!(map.get("01.flac"), Some("other/renamed.flac"));
    }

    #[test]
    fn duplicate_sizes_are_assigned_to_distinct_files() {
        let tmp = folder(&[("a.flac", 10), ("b.flac", 10)]);
        let m = manifest(&[("01.flac", 10), ("02.flac", 10)]);
        let map = reconcile(tmp.path(), &m, &strict())
            .expect("reconcile")
            .into_rename_map()
            .expect("match");
        assert_eq!(map.get("01.flac"), Some("a.flac"));
        assert_eq!(map.get("02.flac"), Some("b.flac"));
    }

    #[test]
    fn size_scan_avoids_files_that_are_direct_hits_for_other_entries() {
        let tmp = folder(&[("b.flac", 10), ("c.flac", 10)]);
        let m = manifest(&[("a.flac", 10), ("b.flac", 10)]);
        let map = reconcile(tmp.path(), &m, &strict())
            .expect("reconcile")
            .into_rename_map()
            .expect("match");
        assert_eq!(map.get("a.flac"), Some("c.flac"));
        assert_eq!(map.get("b.flac"), Some("b.flac"));
    }

    #[test]
    fn size_scan_falls_back_to_first_file_when_all_are_taken() {
        let tmp = folder(&[("only.flac", 10)]);
        let m = manifest(&[("01.flac", 10), ("02.flac", 10)]);
        let map = reconcile(tmp.path(), &m, &strict())
            .expect("reconcile")
            .into_rename_map()
            .expect("match");
        assert_eq!(map.get("01.flac"), Some("only.flac"));
        assert_eq!(map.get("02.flac"), Some("only.flac"));
    }

    #[test]
    fn fuzzy_tier_is_off_by_default() {
        let tmp = folder(&[("01 - Retagged.flac", 1020)]);
        let m = manifest(&[("01 Intro.flac", 1000)]);
        assert_eq!(
            reconcile(tmp.path(), &m, &strict()).expect("reconcile"),
            MatchResult::NoMatch
        );
        let map = reconcile(tmp.path(), &m, &fuzzy())
            .expect("reconcile")
            .into_rename_map()
            .expect("fuzzy match");
        assert_eq!(map.get("01 Intro.flac"), Some("01 - Retagged.flac"));
    }

    #[test]
    fn fuzzy_tier_requires_same_number_and_extension() {
        let tmp = folder(&[("02 Intro.flac", 1000 + 10), ("01 Intro.mp3", 1000 + 10)]);
        let m = manifest(&[("01 Intro.flac", 1000)]);
        assert_eq!(
            reconcile(tmp.path(), &m, &fuzzy()).expect("reconcile"),
            MatchResult::NoMatch
        );
    }

    #[test]
    fn fuzzy_tier_rejects_five_percent_or_more() {
        let tmp = folder(&[("01 a.flac", 1050)]);
        let m = manifest(&[("01 b.flac", 1000)]);
        assert_eq!(
            reconcile(tmp.path(), &m, &fuzzy()).expect("reconcile"),
            MatchResult::NoMatch
        );
    }

    #[test]
    fn fuzzy_signature_uses_base_name() {
        let tmp = folder(&[("Disc 1/03 Song.FLAC", 2010)]);
        let m = manifest(&[("CD1/03 - Song.flac", 2000)]);
        let map = reconcile(tmp.path(), &m, &fuzzy())
            .expect("reconcile")
            .into_rename_map()
            .expect("match");
        assert_eq!(map.get("CD1/03 - Song.flac"), Some("Disc 1/03 Song.FLAC"));
    }

    #[test]
    fn size_closeness_rules() {
        assert!(sizes_are_close(1000, 1049));
        assert!(!sizes_are_close(1000, 1050));
        assert!(sizes_are_close(1049, 1000));
        assert!(sizes_are_close(0, 0));
        assert!(!sizes_are_close(0, 1));
        assert!(!sizes_are_close(1, 0));
        assert!(sizes_are_close(u64::MAX, u64::MAX - 1));
    }

    #[test]
    fn name_signature_extracts_number_and_extension() {
        assert_eq!(
            name_signature("CD1/07 Song.Flac"),
            ("07".to_string(), Some("flac".to_string()))
        );
        assert_eq!(name_signature("README"), (String::new(), None));
        assert_eq!(name_signature("123"), ("123".to_string(), None));
    }

    #[test]
    fn reconcile_is_deterministic() {
        let tmp = folder(&[("x.flac", 10), ("y.flac", 10), ("z.log", 3), ("sub/w.flac", 7)]);
        let m = manifest(&[("1.flac", 10), ("2.flac", 10), ("3.flac", 7), ("rip.log", 3)]);
        let first = reconcile(tmp.path(), &m, &strict()).expect("first");
        let second = reconcile(tmp.path(), &m, &strict()).expect("second");
        assert_ne!(first, MatchResult::NoMatch);
        assert_eq!(first, second);
    }

    #[test]
    fn nothing_resolved_is_no_match() {
        let tmp = folder(&[("01.flac", 123)]);
        assert_eq!(
            reconcile(tmp.path(), &ExpectedManifest::new(), &strict()).expect("reconcile"),
            MatchResult::NoMatch
        );
        let only_optional = manifest(&[("cover.jpg", 9), ("rip.log", 4)]);
        assert_eq!(
            reconcile(tmp.path(), &only_optional, &strict()).expect("reconcile"),
            MatchResult::NoMatch
        );
    }

    #[test]
    fn short_circuits_on_first_missing_required_entry() {
        let tmp = folder(&[("b.flac", 2)]);
        let m = manifest(&[("a.flac", 1), ("b.flac", 2), ("c.log", 3)]);
        assert_eq!(
            reconcile(tmp.path(), &m, &strict()).expect("reconcile"),
            MatchResult::NoMatch
        );
    }
}
