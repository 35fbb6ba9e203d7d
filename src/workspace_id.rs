//! Workspace identity: the ids the language server puts in `--workspace_id` for the folders
//! the user has open.

use std::path::PathBuf;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Characters `encodeURIComponent` leaves untouched; the server derives ids with the same rule.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<PathBuf>,
    /// Multi-root workspace file, if one is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_file: Option<PathBuf>,
}

impl WorkspaceContext {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.workspace_file.is_none()
    }

    pub fn expected_ids(&self, windows: bool) -> Vec<String> {
        expected_workspace_ids(self, windows)
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, URI_COMPONENT).to_string()
}

fn replace_non_alphanumeric(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn normalize_path(path: &str, windows: bool) -> String {
    if windows {
        normalize_windows_path(path)
    } else {
        normalize_unix_path(path)
    }
}

/// `C:\Users\me\proj` -> `file_c_3A_Users_me_proj`. Paths without a drive letter fall back to
/// the Unix rule.
pub fn normalize_windows_path(path: &str) -> String {
    let mut chars = path.chars();
    let drive = match (chars.next(), chars.next()) {
        (Some(d), Some(':')) if d.is_ascii_alphabetic() => d.to_ascii_lowercase(),
        _ => return normalize_unix_path(path),
    };
    let rest = &path[2..];
    let encoded = rest
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("_");
    format!("file_{drive}_3A_{}", replace_non_alphanumeric(&encoded))
}

/// `/home/me/my proj` -> `file_home_me_my_20proj`.
pub fn normalize_unix_path(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    let encoded = slashed
        .split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/");
    let trimmed = encoded.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    format!("file_{}", replace_non_alphanumeric(trimmed))
}

/// One id per folder, then the workspace file, without duplicates.
pub fn expected_workspace_ids(ctx: &WorkspaceContext, windows: bool) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let paths = ctx.folders.iter().chain(ctx.workspace_file.iter());
    for path in paths {
        let id = normalize_path(&path.to_string_lossy(), windows);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}
