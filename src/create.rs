//! Client-side upload validation and the processing-time hint.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Magic bytes every PDF starts with.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Rejections raised before any network call is made.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Please select a PDF file.")]
    NotPdf,

    #[error("File size must be less than {max_mb}MB.")]
    TooLarge { max_mb: u64 },
}

/// A validated file held in memory of the create dialog, not yet uploaded.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// Job title: the file name without its extension.
    pub title: String,
    /// Name including the extension, used for the upload.
    pub filename: String,
    pub size_bytes: u64,
}

impl SelectedFile {
    /// Size in megabytes for display.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Validate a picked file: it must exist, look like a PDF (extension and
/// magic bytes), and fit under the configured size cap.
pub fn validate_pdf(path: &Path, max_size_bytes: u64) -> Result<SelectedFile, ValidationError> {
    let meta =
        fs::metadata(path).map_err(|_| ValidationError::NotFound(path.display().to_string()))?;
    if !meta.is_file() {
        return Err(ValidationError::NotFound(path.display().to_string()));
    }

    let is_pdf_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf_ext || !has_pdf_magic(path) {
        return Err(ValidationError::NotPdf);
    }

    if meta.len() > max_size_bytes {
        return Err(ValidationError::TooLarge {
            max_mb: max_size_bytes / (1024 * 1024),
        });
    }

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.pdf")
        .to_string();
    let title = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    Ok(SelectedFile {
        path: path.to_path_buf(),
        title,
        filename,
        size_bytes: meta.len(),
    })
}

/// Check the leading bytes for the PDF signature. Unreadable files fail the
/// check rather than erroring separately.
fn has_pdf_magic(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut head = [0u8; 5];
    matches!(file.read_exact(&mut head), Ok(())) && &head[..] == PDF_MAGIC
}

/// Advisory processing-time hint from file size alone: roughly 2 seconds per
/// MB plus 5 seconds of base overhead, shown as a ±20% range. Below a minute
/// the range is in seconds, otherwise in whole minutes.
pub fn estimate_processing_time(size_bytes: u64) -> String {
    let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
    let estimated_secs = (5.0 + size_mb * 2.0).ceil();

    let min_secs = (estimated_secs * 0.8).floor().max(5.0) as u64;
    let max_secs = (estimated_secs * 1.2).ceil() as u64;

    if max_secs < 60 {
        return format!("{min_secs}-{max_secs} seconds");
    }

    let min_minutes = min_secs / 60;
    let max_minutes = max_secs.div_ceil(60);

    if min_minutes == max_minutes {
        let plural = if min_minutes > 1 { "s" } else { "" };
        return format!("~{min_minutes} minute{plural}");
    }

    format!("{min_minutes}-{max_minutes} minutes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MB: u64 = 1024 * 1024;

    /// Write a throwaway file under the system temp dir.
    fn temp_file(name_suffix: &str, contents: &[u8]) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("pdfjobs-{}-{name_suffix}", uuid::Uuid::new_v4()));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    fn pdf_bytes(len: usize) -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(len, b'x');
        bytes
    }

    #[test]
    fn rejects_non_pdf_files() {
        let path = temp_file("notes.txt", b"plain text");
        assert_eq!(validate_pdf(&path, 10 * MB), Err(ValidationError::NotPdf));
        let _ = fs::remove_file(&path);

        // A .pdf extension without the magic bytes is not enough.
        let path = temp_file("fake.pdf", b"<html>not a pdf</html>");
        assert_eq!(validate_pdf(&path, 10 * MB), Err(ValidationError::NotPdf));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rejects_files_over_the_cap() {
        let path = temp_file("big.pdf", &pdf_bytes(2 * MB as usize + 1));
        assert_eq!(
            validate_pdf(&path, 2 * MB),
            Err(ValidationError::TooLarge { max_mb: 2 })
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn accepts_a_valid_pdf_under_the_cap() {
        let path = temp_file("report.pdf", &pdf_bytes(MB as usize));
        let file = validate_pdf(&path, 10 * MB).unwrap();
        assert_eq!(file.title, path.file_stem().unwrap().to_str().unwrap());
        assert!(file.filename.ends_with(".pdf"));
        assert_eq!(file.size_bytes, MB);
        assert!((file.size_mb() - 1.0).abs() < 1e-9);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_files_are_reported_as_such() {
        let path = std::env::temp_dir().join("pdfjobs-no-such-file.pdf");
        assert!(matches!(
            validate_pdf(&path, 10 * MB),
            Err(ValidationError::NotFound(_))
        ));
    }

    #[test]
    fn estimates_small_files_in_seconds() {
        // 2MB: ceil(5 + 4) = 9s, range 7-11.
        assert_eq!(estimate_processing_time(2 * MB), "7-11 seconds");
        // Empty file still carries the base overhead.
        assert_eq!(estimate_processing_time(0), "5-6 seconds");
    }

    #[test]
    fn estimates_large_files_in_minutes() {
        // 100MB: ceil(205)s, range 164-246s -> 2-5 minutes.
        assert_eq!(estimate_processing_time(100 * MB), "2-5 minutes");
    }
}
