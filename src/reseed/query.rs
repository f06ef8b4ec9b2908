use crate::reseed::local::LocalDirectory;
use crate::reseed::metadata::{MetadataReader, TagName};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SearchQuery {
    pub search_term: String,
    pub artist_term: String,
}

static PARENTHETICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?\)").expect("valid parenthetical regex"));
static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("valid bracket regex"));

/// Fold whitespace, then drop `(...)` and `[...]` groups. Groups do not nest
/// and an unmatched opener is kept as-is.
pub fn sanitize_tag(raw: &str) -> String {
    let folded = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_parens = PARENTHETICAL_RE.replace_all(&folded, "");
    BRACKETED_RE.replace_all(&without_parens, "").into_owned()
}

fn read_sanitized(
    reader: &dyn MetadataReader,
    path: &std::path::Path,
    tag: TagName,
) -> Option<String> {
    match reader.read_tag(path, tag) {
        Ok(Some(raw)) => {
            let clean = sanitize_tag(&raw);
            if clean.is_empty() { None } else { Some(clean) }
        }
        Ok(None) => None,
        Err(err) => {
            tracing::debug!(
                file = %path.display(),
                tag = tag.label(),
                "tag read failed: {err:#}"
            );
            None
        }
    }
}

/// Derive distinct `(album, artist)` search pairs from the tags of every
/// primary-content file, in walk order.
pub fn build_queries(dir: &LocalDirectory, reader: &dyn MetadataReader) -> Vec<SearchQuery> {
    let mut queries = Vec::new();
    let mut seen = BTreeSet::new();

    for file in dir.primary_content() {
        let Some(album) = read_sanitized(reader, &file.full_path, TagName::Album) else {
            continue;
        };
        let Some(artist) = read_sanitized(reader, &file.full_path, TagName::Artist) else {
            continue;
        };
        let query = SearchQuery {
            search_term: album,
            artist_term: artist,
        };
        if seen.insert(query.clone()) {
            queries.push(query);
        }
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use std::collections::HashMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeReader {
        tags: HashMap<(PathBuf, &'static str), String>,
        broken: Vec<PathBuf>,
    }

    impl FakeReader {
        fn with(mut self, path: &Path, album: &str, artist: &str) -> Self {
            self.tags
                .insert((path.to_path_buf(), "album"), album.to_string());
            self.tags
                .insert((path.to_path_buf(), "artist"), artist.to_string());
            self
        }
    }

    impl MetadataReader for FakeReader {
        fn read_tag(&self, path: &Path, tag: TagName) -> Result<Option<String>> {
            if self.broken.iter().any(|p| p == path) {
                return Err(anyhow!("corrupt stream"));
            }
            Ok(self.tags.get(&(path.to_path_buf(), tag.label())).cloned())
        }
    }

    #[test]
    fn sanitize_folds_whitespace_and_drops_groups() {
        assert_eq!(sanitize_tag("  The   Wall\n"), "The Wall");
        assert_eq!(sanitize_tag("Abbey Road (Remastered)"), "Abbey Road ");
        assert_eq!(sanitize_tag("Live [Disc 1] (2009)"), "Live  ");
        assert_eq!(sanitize_tag("Kid A"), "Kid A");
    }

    #[test]
    fn sanitize_is_non_greedy_and_does_not_nest() {
        assert_eq!(sanitize_tag("a (b) c (d) e"), "a  c  e");
        assert_eq!(sanitize_tag("a ((b) c) d"), "a  c) d");
    }

    #[test]
    fn sanitize_leaves_unbalanced_openers() {
        assert_eq!(sanitize_tag("Album (Deluxe"), "Album (Deluxe");
        assert_eq!(sanitize_tag("Album [x (y)"), "Album [x ");
    }

    fn fixture() -> (tempfile::TempDir, LocalDirectory) {
        let tmp = tempdir().expect("tempdir");
        for name in ["01.flac", "02.flac", "03.mp3", "cover.jpg", "04.flac"] {
            fs::write(tmp.path().join(name), b"x").expect("write");
        }
        let dir = LocalDirectory::scan(tmp.path()).expect("scan");
        (tmp, dir)
    }

    #[test]
    fn queries_are_deduplicated_in_first_seen_order() {
        let (tmp, dir) = fixture();
        let root = tmp.path();
        let reader = FakeReader::default()
            .with(&root.join("01.flac"), "OK Computer (OKNOTOK)", "Radiohead")
            .with(&root.join("02.flac"), "OK Computer", "Radiohead")
            .with(&root.join("03.mp3"), "Amnesiac", "Radiohead")
            .with(&root.join("04.flac"), "Kid A", "Radiohead");

        let got = build_queries(&dir, &reader);
        let terms = got
            .iter()
            .map(|q| q.search_term.as_str())
            .collect::<Vec<_>>();
        assert_eq!(terms, vec!["OK Computer ", "OK Computer", "Amnesiac", "Kid A"]);

        let reader = FakeReader::default()
            .with(&root.join("01.flac"), "Kid A", "Radiohead")
            .with(&root.join("02.flac"), "Kid  A", "Radiohead");
        assert_eq!(build_queries(&dir, &reader).len(), 1);
    }

    #[test]
    fn pairs_with_an_empty_side_are_skipped() {
        let (tmp, dir) = fixture();
        let root = tmp.path();
        let reader = FakeReader::default()
            .with(&root.join("01.flac"), "(Untitled)", "Someone")
            .with(&root.join("02.flac"), "Album", "   ")
            .with(&root.join("04.flac"), "Album", "Artist");
        let got = build_queries(&dir, &reader);
        assert_eq!(
            got,
            vec![SearchQuery {
                search_term: "Album".to_string(),
                artist_term: "Artist".to_string(),
            }]
        );
    }

    #[test]
    fn blank_but_non_empty_sanitized_tags_are_kept() {
        assert_eq!(sanitize_tag("(a) (b)"), " ");
        let (tmp, dir) = fixture();
        let reader = FakeReader::default().with(&tmp.path().join("01.flac"), "(a) (b)", "Artist");
        assert_eq!(
            build_queries(&dir, &reader),
            vec![SearchQuery {
                search_term: " ".to_string(),
                artist_term: "Artist".to_string(),
            }]
        );
    }

    #[test]
    fn unreadable_files_and_supporting_files_are_skipped() {
        let (tmp, dir) = fixture();
        let root = tmp.path();
        let mut reader = FakeReader::default()
            .with(&root.join("cover.jpg"), "Nope", "Nope")
            .with(&root.join("04.flac"), "Album", "Artist");
        reader.broken.push(root.join("01.flac"));
        let got = build_queries(&dir, &reader);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].search_term, "Album");
    }
}
