use std::path::{Path, PathBuf};

use crate::consts::{APP_DIR_NAME, RECLAIM_LOCK_EXT, RUNTIME_DIR_ENV, SOCKET_EXT};

/// Directory holding the channel sockets.
///
/// `ORBX_RUNTIME_DIR` wins, then `$XDG_RUNTIME_DIR/orbx`, then `/tmp/orbx-<euid>`.
#[cfg(unix)]
pub fn default_runtime_dir() -> PathBuf {
    if let Ok(d) = std::env::var(RUNTIME_DIR_ENV) {
        if !d.trim().is_empty() {
            return PathBuf::from(d);
        }
    }
    if let Ok(d) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(d).join(APP_DIR_NAME);
    }
    let uid = unsafe { libc::geteuid() };
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR_NAME, uid))
}

// Named pipes live in their own namespace; the directory is unused.
#[cfg(not(unix))]
pub fn default_runtime_dir() -> PathBuf {
    if let Ok(d) = std::env::var(RUNTIME_DIR_ENV) {
        return PathBuf::from(d);
    }
    std::env::temp_dir().join(APP_DIR_NAME)
}

pub fn safe_for_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Socket file for a logical channel name (`base` or `base/suffix`).
pub fn socket_path(runtime_dir: &Path, channel: &str) -> PathBuf {
    let flat = channel.replace('/', "-");
    runtime_dir.join(format!("{}.{}", safe_for_filename(&flat), SOCKET_EXT))
}

pub fn reclaim_lock_path(runtime_dir: &Path, channel: &str) -> PathBuf {
    let flat = channel.replace('/', "-");
    runtime_dir.join(format!("{}.{}", safe_for_filename(&flat), RECLAIM_LOCK_EXT))
}

/// Windows pipe name for a logical channel name.
pub fn pipe_name(channel: &str) -> String {
    format!(r"\\.\pipe\{}", channel.replace('/', "\\"))
}

/// First 8 characters, for log lines. Link targets are user input, so cut on a char boundary.
pub fn first_8(s: &str) -> &str {
    s.char_indices().nth(8).map_or(s, |(i, _)| &s[..i])
}
