//! Workspace file discovery and fingerprinting

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use weave_core::{CACHE_DIR, FileData};
use xxhash_rust::xxh3::xxh3_64;

/// Directories never considered part of the workspace.
const IGNORED_DIRS: &[&str] = &[".git", "node_modules", CACHE_DIR];

/// Every file under `root` (or under `root/subtree`), workspace-relative
/// and sorted. Honours `.gitignore` even outside a git checkout.
pub fn collect_workspace_files(root: &Path, subtree: Option<&Path>) -> Vec<PathBuf> {
    let start = match subtree {
        Some(subtree) => root.join(subtree),
        None => root.to_path_buf(),
    };

    let walker = WalkBuilder::new(&start)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(|entry| !should_ignore_path(entry.path()))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Walker error: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    tracing::debug!("Collected {} file(s) under {}", files.len(), start.display());
    files
}

fn should_ignore_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

/// Content hash as 16 hex characters.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:016x}", xxh3_64(data))
}

/// Fingerprint `files` (relative to `root`). Unreadable files are skipped.
pub fn fingerprint(root: &Path, files: &[PathBuf]) -> Vec<FileData> {
    files
        .iter()
        .filter_map(|file| match std::fs::read(root.join(file)) {
            Ok(bytes) => Some(FileData::new(file.clone(), content_hash(&bytes))),
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", file.display(), e);
                None
            }
        })
        .collect()
}
