//! Deterministic output file naming.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How an output file name is derived from its input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Naming {
    /// Appended to the input stem, e.g. `_compressed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stem_suffix: Option<String>,
    /// Replaces the input extension, with or without the leading dot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl Naming {
    /// Keep the input file name as-is.
    pub fn pass_through() -> Self {
        Self::default()
    }

    pub fn with_suffix<S: Into<String>>(suffix: S) -> Self {
        Self {
            stem_suffix: Some(suffix.into()),
            extension: None,
        }
    }

    pub fn with_extension<S: Into<String>>(extension: S) -> Self {
        Self {
            stem_suffix: None,
            extension: Some(extension.into()),
        }
    }

    pub fn suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.stem_suffix = Some(suffix.into());
        self
    }

    pub fn extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn resolve(&self, input: &Path, output_dir: &Path) -> PathBuf {
        resolve_output_path(
            input,
            output_dir,
            self.stem_suffix.as_deref(),
            self.extension.as_deref(),
        )
    }
}

/// Compute `output_dir / (stem + suffix + extension)` for one input.
///
/// Pure: no filesystem access. The batch processor calls this both to
/// check for conflicts up front and to name the file it writes.
pub fn resolve_output_path(
    input: &Path,
    output_dir: &Path,
    stem_suffix: Option<&str>,
    extension_override: Option<&str>,
) -> PathBuf {
    let mut file_name: OsString = input.file_stem().map(OsString::from).unwrap_or_default();

    if let Some(suffix) = stem_suffix {
        file_name.push(suffix);
    }

    let extension = match extension_override {
        Some(ext) => Some(OsString::from(ext.trim_start_matches('.'))),
        None => input.extension().map(OsString::from),
    };

    if let Some(ext) = extension.filter(|e| !e.is_empty()) {
        file_name.push(".");
        file_name.push(ext);
    }

    output_dir.join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_and_extension() {
        let out =
            resolve_output_path(Path::new("a/b/in.txt"), Path::new("out"), Some("_x"), Some("pdf"));
        assert_eq!(out, PathBuf::from("out/in_x.pdf"));
    }

    #[test]
    fn test_pass_through_keeps_name() {
        let out = resolve_output_path(Path::new("a/b/in.txt"), Path::new("out"), None, None);
        assert_eq!(out, PathBuf::from("out/in.txt"));
    }

    #[test]
    fn test_suffix_only_changes_stem() {
        let base = resolve_output_path(Path::new("x/photo.jpg"), Path::new("dst"), None, None);
        let suffixed =
            resolve_output_path(Path::new("x/photo.jpg"), Path::new("dst"), Some("_small"), None);
        assert_eq!(base.parent(), suffixed.parent());
        assert_eq!(base.extension(), suffixed.extension());
        assert_eq!(suffixed.file_stem().unwrap(), "photo_small");
    }

    #[test]
    fn test_extension_with_leading_dot() {
        let out = resolve_output_path(Path::new("doc.docx"), Path::new("o"), None, Some(".pdf"));
        assert_eq!(out, PathBuf::from("o/doc.pdf"));
    }

    #[test]
    fn test_input_without_extension() {
        let out = resolve_output_path(Path::new("dir/README"), Path::new("o"), Some("_min"), None);
        assert_eq!(out, PathBuf::from("o/README_min"));
    }

    #[test]
    fn test_only_last_extension_is_replaced() {
        let out =
            resolve_output_path(Path::new("archive.tar.gz"), Path::new("o"), None, Some("zip"));
        assert_eq!(out, PathBuf::from("o/archive.tar.zip"));
    }

    #[test]
    fn test_naming_is_deterministic() {
        let naming = Naming::with_suffix("_compressed").extension("mp4");
        let a = naming.resolve(Path::new("clips/a.mov"), Path::new("out"));
        let b = naming.resolve(Path::new("clips/a.mov"), Path::new("out"));
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("out/a_compressed.mp4"));
    }
}
