use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Suffix WhatsApp uses for one-to-one chats.
pub const INDIVIDUAL_CHAT_SUFFIX: &str = "@c.us";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Target already exists: {0}")]
    DuplicateTarget(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Invalid target: {0:?}")]
    InvalidTarget(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Turn a configured identifier into a chat address.
///
/// Anything already carrying an `@` (e.g. `123@g.us`) is passed through;
/// bare numbers get the individual-chat suffix.
pub fn normalize_address(target: &str) -> String {
    if target.contains('@') {
        target.to_string()
    } else {
        format!("{target}{INDIVIDUAL_CHAT_SUFFIX}")
    }
}

/// Split a persisted comma-joined value. Duplicates are kept as-is.
pub fn parse_targets(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Recipient list persisted as a single `KEY=a,b,c` line in an env-style file.
///
/// Reads always go to disk. Mutations rewrite the whole file and update the
/// live view under the same lock so the two never disagree in-process.
/// Read-modify-write across callers is not arbitrated: last writer wins.
pub struct RecipientStore {
    path: PathBuf,
    key: String,
    live: RwLock<Vec<String>>,
}

impl RecipientStore {
    pub fn open(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        let store = Self {
            path: path.into(),
            key: key.into(),
            live: RwLock::new(Vec::new()),
        };
        let initial = store.list();
        info!(
            "Recipient store at {} ({} targets)",
            store.path.display(),
            initial.len()
        );
        store.set_live(initial);
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current recipients in file order. Never fails: a missing or unreadable
    /// file yields an empty list.
    pub fn list(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => self
                .find_value(&content)
                .map(parse_targets)
                .unwrap_or_default(),
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Last list written or loaded by this process.
    pub fn live(&self) -> Vec<String> {
        match self.live.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Append a target. Surrounding whitespace is trimmed before the duplicate
    /// check; separators that would split or escape the stored line are refused.
    pub fn add(&self, target: &str) -> Result<Vec<String>, StoreError> {
        let target = target.trim();
        if target.is_empty() || target.contains([',', '\r', '\n']) {
            return Err(StoreError::InvalidTarget(target.to_string()));
        }
        let mut targets = self.list();
        if targets.iter().any(|t| t == target) {
            return Err(StoreError::DuplicateTarget(target.to_string()));
        }
        targets.push(target.to_string());
        self.save(&targets)?;
        info!("Added target {}", target);
        Ok(targets)
    }

    pub fn remove(&self, target: &str) -> Result<Vec<String>, StoreError> {
        let mut targets = self.list();
        let before = targets.len();
        targets.retain(|t| t != target);
        if targets.len() == before {
            return Err(StoreError::TargetNotFound(target.to_string()));
        }
        self.save(&targets)?;
        info!("Removed target {}", target);
        Ok(targets)
    }

    fn find_value<'a>(&self, content: &'a str) -> Option<&'a str> {
        let prefix = format!("{}=", self.key);
        content
            .lines()
            .filter_map(|line| line.strip_prefix(prefix.as_str()))
            .last()
            .map(unquote)
    }

    fn save(&self, targets: &[String]) -> Result<(), StoreError> {
        // Held across the write so the live view tracks the file exactly.
        let mut live = match self.live.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let existing = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let content = rewrite_key(&existing, &self.key, &targets.join(","));
        debug!("Saving {} targets to {}", targets.len(), self.path.display());
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        *live = targets.to_vec();
        Ok(())
    }

    fn set_live(&self, targets: Vec<String>) {
        match self.live.write() {
            Ok(mut guard) => *guard = targets,
            Err(poisoned) => *poisoned.into_inner() = targets,
        }
    }
}

/// Strip one pair of matching surrounding quotes, as dotenv readers do.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Replace every `KEY=` line with the new value, or append one.
fn rewrite_key(content: &str, key: &str, value: &str) -> String {
    let prefix = format!("{key}=");
    let new_line = format!("{key}={value}");
    let mut found = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            if line.starts_with(&prefix) {
                found = true;
                new_line.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !found {
        lines.push(new_line);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
