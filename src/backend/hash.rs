use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{ConvError, Result};
use super::Backend;

/// Checksum lists are named `CHECKSUM.<algorithm>`
pub const CHECKSUM_STEM: &str = "CHECKSUM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 8] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha3_256,
        HashAlgorithm::Sha3_384,
        HashAlgorithm::Sha3_512,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha3_256 => "sha3_256",
            HashAlgorithm::Sha3_384 => "sha3_384",
            HashAlgorithm::Sha3_512 => "sha3_512",
        }
    }

    /// `CHECKSUM.sha256` and friends
    pub fn checksum_filename(&self) -> String {
        format!("{}.{}", CHECKSUM_STEM, self.name())
    }

    /// The algorithm a checksum list was written with, from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConvError::UnsupportedFormat(format!(
                    "checksum file '{}' has no algorithm extension",
                    path.display()
                ))
            })?
            .parse()
    }

    pub fn digest(&self, content: &[u8]) -> String {
        match self {
            HashAlgorithm::Md5 => hex_digest::<md5::Md5>(content),
            HashAlgorithm::Sha1 => hex_digest::<sha1::Sha1>(content),
            HashAlgorithm::Sha256 => hex_digest::<sha2::Sha256>(content),
            HashAlgorithm::Sha384 => hex_digest::<sha2::Sha384>(content),
            HashAlgorithm::Sha512 => hex_digest::<sha2::Sha512>(content),
            HashAlgorithm::Sha3_256 => hex_digest::<sha3::Sha3_256>(content),
            HashAlgorithm::Sha3_384 => hex_digest::<sha3::Sha3_384>(content),
            HashAlgorithm::Sha3_512 => hex_digest::<sha3::Sha3_512>(content),
        }
    }

    pub fn digest_file(&self, path: &Path) -> Result<String> {
        let content = fs::read(path)?;
        Ok(self.digest(&content))
    }
}

fn hex_digest<D: Digest>(content: &[u8]) -> String {
    hex::encode(D::digest(content))
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim_start_matches('.').to_ascii_lowercase().replace('-', "_");
        HashAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.name() == wanted)
            .ok_or_else(|| ConvError::UnsupportedFormat(format!("hash algorithm '{}'", s)))
    }
}

/// Checksum lists in `sha256sum` format (and its md5/sha1/sha3 siblings)
#[derive(Debug, Default)]
pub struct HashBackend;

impl HashBackend {
    pub fn new() -> Self {
        Self
    }

    /// Write one `<digest>  <name>` line per input.
    ///
    /// Names are relative to the checksum file's directory so the list can
    /// be verified from anywhere.
    pub fn generate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        algorithm: HashAlgorithm,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        info!("Hashing {} file(s) into {}", inputs.len(), output.display());
        let base = absolute_parent(output)?;

        let mut listing = String::new();
        for (i, input) in inputs.iter().enumerate() {
            let digest = algorithm.digest_file(input)?;
            let absolute = std::path::absolute(input)?;
            let name = pathdiff::diff_paths(&absolute, &base).unwrap_or(absolute);
            debug!("{}  {}", digest, name.display());

            listing.push_str(&format!("{}  {}\n", digest, name.display()));
            progress((i + 1) as f64 * 100.0 / inputs.len() as f64);
        }

        fs::write(output, listing)?;
        Ok(())
    }

    /// Verify every entry of a checksum list; the first mismatch is an error.
    ///
    /// The algorithm comes from the list's extension.
    pub fn check(&self, checksum_file: &Path, progress: &mut dyn FnMut(f64)) -> Result<usize> {
        let algorithm = HashAlgorithm::from_path(checksum_file)?;
        info!("Checking {} ({})", checksum_file.display(), algorithm);
        let base = absolute_parent(checksum_file)?;
        let content = fs::read_to_string(checksum_file)?;
        let entries = parse_listing(&content)?;

        for (i, (expected, name)) in entries.iter().enumerate() {
            let file = base.join(name);
            if !file.exists() {
                return Err(ConvError::FileNotFound(file));
            }
            let actual = algorithm.digest_file(&file)?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ConvError::HashMismatch {
                    file,
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!("{}: OK", name);
            progress((i + 1) as f64 * 100.0 / entries.len() as f64);
        }

        info!("{} file(s) verified", entries.len());
        Ok(entries.len())
    }
}

fn absolute_parent(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    Ok(std::path::absolute(parent)?)
}

/// `(digest, name)` pairs; blank lines and `#` comments are skipped.
fn parse_listing(content: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim_end();
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let (digest, name) = line.split_once(char::is_whitespace).ok_or_else(|| {
            ConvError::InvalidArgument(format!("malformed checksum line {}: '{}'", n + 1, line))
        })?;
        // sha256sum marks binary mode with a leading '*'
        let name = name.trim_start().trim_start_matches('*');
        if name.is_empty() {
            return Err(ConvError::InvalidArgument(format!(
                "missing file name on checksum line {}",
                n + 1
            )));
        }
        entries.push((digest.to_string(), name.to_string()));
    }
    Ok(entries)
}

impl Backend for HashBackend {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn supported_in_formats(&self) -> Vec<&'static str> {
        vec!["*"]
    }

    fn supported_out_formats(&self) -> Vec<&'static str> {
        HashAlgorithm::ALL.iter().map(|alg| alg.name()).collect()
    }
}
