//! Read-only filesystem operations confined to a root directory
//!
//! Every user-supplied path is resolved against the root. Paths that end
//! up outside it, through `..`, absolute paths or symlinks, are refused.
//! Missing files are not errors: operations answer with an
//! `{"error": ...}` object so the model can react to them.

use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

/// Default cap on bytes returned by `read_file`
pub const DEFAULT_READ_LIMIT: usize = 200_000;

/// Default cap on `search` matches
pub const DEFAULT_MAX_RESULTS: usize = 25;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("path outside of allowed root: {0}")]
    OutsideRoot(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// The directory tree the server is allowed to read
#[derive(Debug, Clone)]
pub struct FsRoot {
    root: PathBuf,
    read_limit: usize,
}

impl FsRoot {
    /// Open a root. The directory must exist.
    pub fn new(root: impl AsRef<Path>, read_limit: usize) -> std::io::Result<Self> {
        Ok(Self {
            root: dunce::canonicalize(root)?,
            read_limit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn read_limit(&self) -> usize {
        self.read_limit
    }

    /// Resolve `user_path` under the root
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf, FsError> {
        let joined = normalize_path(&self.root.join(user_path));

        // Existing paths are canonicalized so symlinks cannot escape
        let resolved = if joined.exists() {
            dunce::canonicalize(&joined)?
        } else {
            joined
        };

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(FsError::OutsideRoot(user_path.to_string()))
        }
    }

    pub fn list_dir(&self, path: &str) -> Result<Value, FsError> {
        let p = self.resolve(path)?;
        if !p.exists() {
            return Ok(not_found("not_found", &p));
        }
        if !p.is_dir() {
            return Ok(not_found("not_a_directory", &p));
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&p)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "is_dir": metadata.is_dir(),
                "size": metadata.is_file().then_some(metadata.len()),
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(json!({ "path": p.display().to_string(), "entries": entries }))
    }

    pub fn stat(&self, path: &str) -> Result<Value, FsError> {
        let p = self.resolve(path)?;
        if !p.exists() {
            return Ok(not_found("not_found", &p));
        }
        let metadata = std::fs::metadata(&p)?;

        Ok(json!({
            "path": p.display().to_string(),
            "is_dir": metadata.is_dir(),
            "size": metadata.len(),
            "mtime": unix_seconds(metadata.modified().ok()),
            "ctime": change_time(&metadata),
        }))
    }

    /// Read up to `max_bytes` (capped by the root's read limit).
    ///
    /// Content that is not UTF-8 comes back base64-encoded.
    pub fn read_file(&self, path: &str, max_bytes: Option<i64>) -> Result<Value, FsError> {
        let max_bytes = match max_bytes {
            Some(n) if n <= 0 => return Ok(json!({ "error": "invalid_max_bytes" })),
            Some(n) => (n as u64).min(self.read_limit as u64) as usize,
            None => self.read_limit,
        };

        let p = self.resolve(path)?;
        if !p.is_file() {
            return Ok(not_found("not_found_or_not_file", &p));
        }

        let mut data = Vec::with_capacity(max_bytes.min(64 * 1024) + 1);
        let read = std::fs::File::open(&p)
            .and_then(|file| file.take(max_bytes as u64 + 1).read_to_end(&mut data));
        if let Err(e) = read {
            return Ok(json!({ "error": "read_failed", "reason": e.to_string() }));
        }

        let truncated = data.len() > max_bytes;
        data.truncate(max_bytes);

        let (content, encoding) = match String::from_utf8(data) {
            Ok(text) => (text, "utf-8"),
            Err(e) => (BASE64.encode(e.into_bytes()), "base64"),
        };

        Ok(json!({
            "path": p.display().to_string(),
            "content": content,
            "truncated": truncated,
            "encoding": encoding,
        }))
    }

    /// Case-insensitive file name search below `path`
    pub fn search(&self, path: &str, query: &str, max_results: Option<i64>) -> Result<Value, FsError> {
        let max_results = match max_results {
            Some(n) if n <= 0 => return Ok(json!({ "error": "invalid_max_results" })),
            Some(n) => n as usize,
            None => DEFAULT_MAX_RESULTS,
        };

        let p = self.resolve(path)?;
        if !p.is_dir() {
            return Ok(not_found("not_found_or_not_dir", &p));
        }

        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        let mut truncated = false;

        let files = walkdir::WalkDir::new(&p)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());

        for entry in files {
            if entry.file_name().to_string_lossy().to_lowercase().contains(&needle) {
                if matches.len() >= max_results {
                    truncated = true;
                    break;
                }
                matches.push(entry.path().display().to_string());
            }
        }

        Ok(json!({
            "path": p.display().to_string(),
            "matches": matches,
            "truncated": truncated,
        }))
    }

    /// Body of the `resource://capabilities` resource
    pub fn capabilities(&self, name: &str, tools: &[&str]) -> Value {
        json!({
            "name": name,
            "description": "Filesystem access (read-only) with path-rooting and size limits",
            "tools": tools,
            "root": self.root.display().to_string(),
            "read_limit_bytes": self.read_limit,
        })
    }
}

fn not_found(code: &str, path: &Path) -> Value {
    json!({ "error": code, "path": path.display().to_string() })
}

fn unix_seconds(time: Option<std::time::SystemTime>) -> Option<u64> {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

#[cfg(unix)]
fn change_time(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    u64::try_from(metadata.ctime()).ok()
}

#[cfg(not(unix))]
fn change_time(metadata: &std::fs::Metadata) -> Option<u64> {
    unix_seconds(metadata.created().ok())
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
