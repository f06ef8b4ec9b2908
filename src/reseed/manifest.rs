//! Decoder for the catalog's flat file-list encoding.
//!
//! A file list looks like `name1{{{size1}}}|||name2{{{size2}}}`. Names are
//! HTML-entity-encoded by the catalog and are decoded here.

use crate::error::ReseedError;
use std::collections::BTreeMap;

pub const ENTRY_DELIMITER: &str = "|||";
pub const SIZE_OPEN: &str = "{{{";
pub const SIZE_CLOSE: &str = "}}}";

/// Expected relative path -> expected byte size.
pub type ExpectedManifest = BTreeMap<String, u64>;

fn parse_entry(entry: &str) -> Result<(String, u64), ReseedError> {
    let Some(open) = entry.rfind(SIZE_OPEN) else {
        return Err(ReseedError::MalformedManifest(format!(
            "entry `{entry}` has no `{SIZE_OPEN}` size marker"
        )));
    };
    let raw_name = &entry[..open];
    let rest = &entry[open + SIZE_OPEN.len()..];
    let Some(close) = rest.rfind(SIZE_CLOSE) else {
        return Err(ReseedError::MalformedManifest(format!(
            "entry `{entry}` has no `{SIZE_CLOSE}` size marker"
        )));
    };
    let raw_size = &rest[..close];
    let size = raw_size.trim().parse::<u64>().map_err(|_| {
        ReseedError::MalformedManifest(format!("size `{raw_size}` of `{raw_name}` is not numeric"))
    })?;

    let name = html_escape::decode_html_entities(raw_name).into_owned();
    Ok((name, size))
}

pub fn parse(raw: &str) -> Result<ExpectedManifest, ReseedError> {
    if raw.trim().is_empty() {
        return Err(ReseedError::MalformedManifest("file list is empty".to_string()));
    }
    let mut manifest = ExpectedManifest::new();
    for entry in raw.split(ENTRY_DELIMITER) {
        let (name, size) = parse_entry(entry)?;
        manifest.insert(name, size);
    }
    Ok(manifest)
}

/// Inverse of [`parse`]; `&`, `<` and `>` in names are entity-encoded.
pub fn encode(manifest: &ExpectedManifest) -> String {
    manifest
        .iter()
        .map(|(name, size)| {
            let name = html_escape::encode_text(name);
            format!("{name}{SIZE_OPEN}{size}{SIZE_CLOSE}")
        })
        .collect::<Vec<_>>()
        .join(ENTRY_DELIMITER)
}
