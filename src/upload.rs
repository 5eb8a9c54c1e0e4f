//! Upload boundary checks. Runs before anything is written to the store.

use crate::config::PipelineConfig;
use crate::error::ValidationError;
use crate::model::DocumentKind;
use std::path::Path;

/// An upload that passed [`validate_upload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedUpload {
    /// Kind declared by the extension.
    pub kind: DocumentKind,
    pub size_bytes: u64,
}

/// Lowercased extension of `filename`, without the dot.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Check the extension and size of an upload.
///
/// The order of checks is extension, emptiness, then size, so a huge file
/// with a bad extension reports the extension.
pub fn validate_upload(
    filename: &str,
    size_bytes: u64,
    config: &PipelineConfig,
) -> Result<AcceptedUpload, ValidationError> {
    let ext = extension_of(filename).unwrap_or_default();
    let kind = config
        .allowed_extensions
        .iter()
        .any(|a| *a == ext)
        .then(|| DocumentKind::from_extension(&ext))
        .flatten()
        .ok_or_else(|| ValidationError::UnsupportedExtension {
            filename: filename.to_string(),
            extension: if ext.is_empty() { "<none>".into() } else { format!(".{ext}") },
            allowed: config
                .allowed_extensions
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", "),
        })?;

    if size_bytes == 0 {
        return Err(ValidationError::EmptyFile {
            filename: filename.to_string(),
        });
    }
    if size_bytes > config.max_upload_bytes {
        return Err(ValidationError::FileTooLarge {
            size_bytes,
            max_mb: config.max_upload_mb(),
        });
    }
    Ok(AcceptedUpload { kind, size_bytes })
}
