//! Checksum file parsing.
//!
//! Accepts either a bare digest or `sha256sum`-style lines:
//!
//! ```text
//! 3b7a...e1  tool_linux_amd64.tar.gz
//! 9f0c...42 *tool_darwin_arm64.tar.gz
//! ```

use std::path::Path;

/// Find the digest for `asset` in a checksum file.
///
/// Lines are matched on the full file name first, then on its base name.
/// A file holding a single bare digest applies to any asset.
pub fn find_checksum(content: &str, asset: &str) -> Option<String> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(digest), file) = (parts.next(), parts.next()) else {
            continue;
        };
        if !is_digest(digest) {
            continue;
        }
        let file = file.map(|f| f.trim_start_matches('*'));
        entries.push((digest.to_lowercase(), file));
    }

    if let [(digest, None)] = entries.as_slice() {
        return Some(digest.clone());
    }

    let asset_base = base_name(asset);
    entries
        .iter()
        .find(|(_, file)| *file == Some(asset))
        .or_else(|| {
            entries
                .iter()
                .find(|(_, file)| file.is_some_and(|f| base_name(f) == asset_base))
        })
        .map(|(digest, _)| digest.clone())
}

fn is_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
