use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{RatingError, RatingResult};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn now_utc_string() -> String {
    rfc3339_string(Utc::now())
}

pub fn rfc3339_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Reduces a caller-supplied image reference (bare stem, file name, relative
/// path, URL path, Windows path) to the sample id: the file name without a
/// known image extension.
pub fn canonical_sample_id(raw: &str) -> RatingResult<String> {
    let trimmed = raw.trim();
    let file_name = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .trim();

    let stem = match file_name.rsplit_once('.') {
        Some((stem, ext))
            if IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known)) =>
        {
            stem
        }
        _ => file_name,
    };

    if stem.is_empty() {
        return Err(RatingError::validation(format!(
            "sample id is empty after canonicalization: {raw:?}"
        )));
    }

    Ok(stem.to_string())
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_sample_id_strips_directories_and_known_extensions() {
        assert_eq!(canonical_sample_id("case_01").unwrap(), "case_01");
        assert_eq!(canonical_sample_id("case_01.jpg").unwrap(), "case_01");
        assert_eq!(canonical_sample_id("case_01.JPEG").unwrap(), "case_01");
        assert_eq!(
            canonical_sample_id("/static/images/case_01.png").unwrap(),
            "case_01"
        );
        assert_eq!(canonical_sample_id(r"C:\scans\case_01.jpg").unwrap(), "case_01");
    }

    #[test]
    fn canonical_sample_id_keeps_unknown_extensions() {
        assert_eq!(canonical_sample_id("chest.v2").unwrap(), "chest.v2");
        assert_eq!(canonical_sample_id("notes.txt").unwrap(), "notes.txt");
    }

    #[test]
    fn canonical_sample_id_rejects_empty_values() {
        assert!(canonical_sample_id("").is_err());
        assert!(canonical_sample_id("images/").is_err());
        assert!(canonical_sample_id(".jpg").is_err());
    }

    #[test]
    fn has_image_extension_is_case_insensitive() {
        assert!(has_image_extension(Path::new("a/b/C.PNG")));
        assert!(!has_image_extension(Path::new("a/b/c.txt")));
        assert!(!has_image_extension(Path::new("noext")));
    }
}
