//! Target file name handling for saves into an output directory.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Name used when a target file name sanitizes down to nothing.
const FALLBACK_FILE_NAME: &str = "download.bin";

/// Sanitizes a file name for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`, and neutralizes
/// `.`/`..` so the result always names a file directly inside a directory.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Resolves a collision-free path for `file_name` inside `dir`.
///
/// `resume.pdf`, then `resume_2.pdf`, `resume_3.pdf`, ...
#[must_use]
pub fn resolve_unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let file_name = {
        let sanitized = sanitize_filename(file_name);
        if sanitized.trim_matches('_').is_empty() {
            FALLBACK_FILE_NAME.to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&file_name);
    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], &file_name[pos..]),
        _ => (file_name.as_str(), ""),
    };

    for i in 2..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

/// Hidden sibling path a save is written to before being renamed into place.
#[must_use]
pub fn staging_path(final_path: &Path, token: u64) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    final_path.with_file_name(format!(".{name}.{token}.part"))
}

/// Default target file name for a location: its last path segment.
#[must_use]
pub fn file_name_from_location(location: &str) -> String {
    let segment = Url::parse(location)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_else(|| {
            location
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });

    if segment.trim().is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        sanitize_filename(&segment)
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
