//! Cookie-style key/value stores backing the credential pair

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Cookie attributes applied on `set`.
///
/// The default carries no expiry and no `secure` flag, matching what the
/// login and refresh paths have always written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub max_age: Option<Duration>,
    pub secure: bool,
}

/// Synchronous key/value persistence for credentials
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str, options: &CookieOptions);
    fn remove(&self, key: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Cookie {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
    #[serde(default)]
    secure: bool,
}

impl Cookie {
    fn new(value: &str, options: &CookieOptions) -> Self {
        Self {
            value: value.to_string(),
            expires_at: options.max_age.map(|age| unix_now() + age.as_secs()),
            secure: options.secure,
        }
    }

    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| at > now) && !self.value.is_empty()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies
            .get(key)
            .filter(|c| c.is_live(unix_now()))
            .map(|c| c.value.clone())
    }

    fn set(&self, key: &str, value: &str, options: &CookieOptions) {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.insert(key.to_string(), Cookie::new(value, options));
    }

    fn remove(&self, key: &str) {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.remove(key);
    }
}

/// JSON cookie jar persisted to disk
///
/// The whole jar is rewritten on every change through a temporary file and a
/// rename. Write failures are logged and the in-memory copy stays
/// authoritative for the rest of the process.
#[derive(Debug)]
pub struct CookieJar {
    path: PathBuf,
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl CookieJar {
    /// Open a jar, starting empty if the file is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cookies = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Discarding unreadable cookie jar");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cookie jar");
                HashMap::new()
            }
        };

        debug!(path = %path.display(), entries = cookies.len(), "Opened cookie jar");
        Self {
            path,
            cookies: Mutex::new(cookies),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, cookies: &HashMap<String, Cookie>) {
        if let Err(e) = write_atomically(&self.path, cookies) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist cookie jar");
        }
    }
}

fn write_atomically(path: &Path, cookies: &HashMap<String, Cookie>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(cookies)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

impl CredentialStore for CookieJar {
    fn get(&self, key: &str) -> Option<String> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies
            .get(key)
            .filter(|c| c.is_live(unix_now()))
            .map(|c| c.value.clone())
    }

    fn set(&self, key: &str, value: &str, options: &CookieOptions) {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.insert(key.to_string(), Cookie::new(value, options));
        self.persist(&cookies);
    }

    fn remove(&self, key: &str) {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        if cookies.remove(key).is_some() {
            self.persist(&cookies);
        }
    }
}
