//! Tag reading for primary-content files, backed by lofty.

use anyhow::{Context, Result};
use lofty::prelude::*;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagName {
    Album,
    Artist,
}

impl TagName {
    pub fn label(self) -> &'static str {
        match self {
            TagName::Album => "album",
            TagName::Artist => "artist",
        }
    }
}

pub trait MetadataReader {
    /// Raw tag value, `None` when the file has no such tag.
    fn read_tag(&self, path: &Path, tag: TagName) -> Result<Option<String>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyMetadataReader;

impl MetadataReader for LoftyMetadataReader {
    fn read_tag(&self, path: &Path, tag: TagName) -> Result<Option<String>> {
        let tagged_file = lofty::read_from_path(path)
            .with_context(|| format!("failed to read tags from {}", path.display()))?;
        let Some(primary) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(None);
        };
        let value = match tag {
            TagName::Album => primary.album(),
            TagName::Artist => primary.artist(),
        };
        Ok(value.map(|v| v.to_string()))
    }
}
