//! Schema canonicalization and checksums
//!
//! A raw schema dump is reduced to a case-, whitespace- and order-insensitive
//! set of lines and hashed with SHA-1. Two dumps with the same checksum
//! describe the same structure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

static COMMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(--|#|/\*.*\*/\s*;?\s*$)").expect("valid regex"));

static ADMIN_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(set\b|use\b|start\s+transaction\b|begin\b|commit\b|rollback\b|lock\s+tables\b|unlock\s+tables\b|delimiter\b).*;\s*$",
    )
    .expect("valid regex")
});

static AUTO_INCREMENT_COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*auto_increment\s*=\s*[0-9]+").expect("valid regex"));

static DEFAULT_COLLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s?default\s+collate[=\s]+[a-z0-9_]+").expect("valid regex"));

static COLLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s?collate[=\s]+[a-z0-9_]+").expect("valid regex"));

static TEMPLATE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s?%[a-z0-9_]+%").expect("valid regex"));

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]+").expect("valid regex"));

/// The four inspectable forms of one schema dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaChecksum {
    pub raw: String,
    pub normalized: String,
    pub sorted: String,
    pub checksum: String,
}

impl SchemaChecksum {
    pub fn compute(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        let sorted = sort_lines(&normalized);
        let checksum = sha1_hex(&sorted);

        Self {
            raw,
            normalized,
            sorted,
            checksum,
        }
    }

    /// Write `<name>.sql`, `<name>.nml`, `<name>.srt` and `<name>.cs` into `directory`
    pub fn write_artifacts(&self, directory: &Path, name: &str) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(directory)?;

        let artifacts = [
            ("sql", &self.raw),
            ("nml", &self.normalized),
            ("srt", &self.sorted),
            ("cs", &self.checksum),
        ];

        let mut written = Vec::with_capacity(artifacts.len());
        for (extension, contents) in artifacts {
            let path = directory.join(format!("{}.{}", name, extension));
            fs::write(&path, contents)?;
            written.push(path);
        }

        tracing::debug!(schema = name, directory = %directory.display(), "Wrote checksum artifacts");
        Ok(written)
    }
}

/// Canonicalize a raw schema dump, one structural line per output line
pub fn normalize(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !COMMENT_LINE.is_match(line) && !ADMIN_LINE.is_match(line))
        .filter_map(|line| {
            let line = AUTO_INCREMENT_COUNTER.replace_all(line, "");
            let line = line.to_lowercase();
            let line = DEFAULT_COLLATE.replace_all(&line, "");
            let line = COLLATE.replace_all(&line, "");
            let line = TEMPLATE_PLACEHOLDER.replace_all(&line, "");
            let line = NON_WORD.replace_all(&line, " ");
            let line = line.trim();
            (!line.is_empty()).then(|| line.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sort the lines of a normalized dump
pub fn sort_lines(normalized: &str) -> String {
    let mut lines: Vec<&str> = normalized.lines().filter(|l| !l.is_empty()).collect();
    lines.sort_unstable();
    lines.join("\n")
}

/// Lower-case hex SHA-1 digest
pub fn sha1_hex(text: &str) -> String {
    format!("{:x}", Sha1::digest(text.as_bytes()))
}

/// Checksum of a raw schema dump
pub fn checksum(raw: &str) -> String {
    sha1_hex(&sort_lines(&normalize(raw)))
}
