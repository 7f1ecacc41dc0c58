//! On-disk layout of a file store directory.
//!
//! ```text
//! <root>/
//!   locks/<id>.lease      one JSON LockRecord per lock
//!   guards/<id>.guard     present while a writer holds the record
//!   sessions/<id>.json    last known address per client
//! ```
//!
//! Ids are escaped so that any valid lock id maps to exactly one portable
//! file name: `[a-z0-9_-]` pass through, every other byte becomes `%XX`.
//! Upper-case letters are escaped too, so case-insensitive filesystems
//! still keep `Job` and `job` apart.
//!
//! Escaping can triple an id's length, which would push long ids past the
//! filesystem's name limit. Stems longer than [`MAX_READABLE_STEM`] become a
//! readable prefix, `~`, and the SHA-256 of the raw id. `~` is always escaped
//! in readable stems, so the two forms never collide. The real id lives in
//! the record itself.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const LOCKS_DIR: &str = "locks";
pub const GUARDS_DIR: &str = "guards";
pub const SESSIONS_DIR: &str = "sessions";

pub const RECORD_EXT: &str = "lease";
pub const GUARD_EXT: &str = "guard";
pub const SESSION_EXT: &str = "json";

/// Longest stem kept fully readable.
pub const MAX_READABLE_STEM: usize = 160;

/// Readable prefix kept in front of a digest stem.
const DIGEST_PREFIX_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub root: PathBuf,
    pub locks_dir: PathBuf,
    pub guards_dir: PathBuf,
    pub sessions_dir: PathBuf,
}

impl StoreLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            locks_dir: root.join(LOCKS_DIR),
            guards_dir: root.join(GUARDS_DIR),
            sessions_dir: root.join(SESSIONS_DIR),
            root,
        }
    }

    pub fn record_path(&self, lock_id: &str) -> PathBuf {
        self.locks_dir
            .join(format!("{}.{}", encode_id(lock_id), RECORD_EXT))
    }

    pub fn guard_path(&self, lock_id: &str) -> PathBuf {
        self.guards_dir
            .join(format!("{}.{}", encode_id(lock_id), GUARD_EXT))
    }

    pub fn session_path(&self, client_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.{}", encode_id(client_id), SESSION_EXT))
    }
}

/// Escape an id into a file stem.
pub fn encode_id(id: &str) -> String {
    let escaped = escape(id, usize::MAX);
    if escaped.len() <= MAX_READABLE_STEM {
        return escaped;
    }

    let digest = Sha256::digest(id.as_bytes());
    format!("{}~{:x}", escape(id, DIGEST_PREFIX_LEN), digest)
}

/// Escape bytes of `id` until the next one would take the stem past `limit`.
fn escape(id: &str, limit: usize) -> String {
    let mut out = String::with_capacity(id.len().min(limit));
    for byte in id.bytes() {
        let piece = match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => (byte as char).to_string(),
            _ => format!("%{:02X}", byte),
        };
        if out.len() + piece.len() > limit {
            break;
        }
        out.push_str(&piece);
    }
    out
}
