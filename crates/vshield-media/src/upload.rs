//! Upload naming and validation.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Length of the random prefix added to stored uploads.
const UPLOAD_PREFIX_LEN: usize = 8;

/// Lowercased extension after the last dot, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Check a filename's extension against an allow-list.
///
/// Matching is case-insensitive and tolerates a leading dot in allow-list
/// entries, so `mp4` and `.MP4` are equivalent.
pub fn allowed_file<S: AsRef<str>>(filename: &str, allowed_extensions: &[S]) -> bool {
    match file_extension(filename) {
        Some(ext) => allowed_extensions
            .iter()
            .any(|allowed| allowed.as_ref().trim_start_matches('.').eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// Reduce a client-supplied filename to a safe, flat ASCII name.
///
/// Path separators become word breaks, whitespace runs become underscores,
/// anything outside `[A-Za-z0-9_.-]` is dropped, and leading/trailing dots
/// and underscores are stripped. The result may be empty.
pub fn secure_filename(filename: &str) -> String {
    let flattened = filename.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Where an upload is stored for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// Filename as sent by the client
    pub original_filename: String,
    /// Sanitized filename
    pub filename: String,
    /// Random prefix distinguishing concurrent uploads of the same name
    pub prefix: String,
    /// Full storage path
    pub path: PathBuf,
}

impl UploadRecord {
    /// Allocate a storage path under `upload_dir` for `original_filename`.
    pub fn new(upload_dir: impl AsRef<Path>, original_filename: &str) -> Self {
        let filename = secure_filename(original_filename);
        let prefix = Uuid::new_v4().simple().to_string()[..UPLOAD_PREFIX_LEN].to_string();
        let path = upload_dir.as_ref().join(format!("{}_{}", prefix, filename));

        Self {
            original_filename: original_filename.to_string(),
            filename,
            prefix,
            path,
        }
    }
}
