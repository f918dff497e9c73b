//! File-backed record of proposals that have already been announced.
//!
//! Data model: a single JSON array of proposal-ID strings, e.g.
//!   ["gov_action1abc...", "gov_action1def..."]
//!
//! The set only grows. A missing or unreadable file is a fresh start rather
//! than an error: re-announcing a proposal is preferable to a dead bot.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// IDs of proposals a message has been dispatched for.
pub type NotifiedSet = BTreeSet<String>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the notified set. Never fails: absence and corruption both yield
    /// an empty set.
    pub async fn load(&self) -> NotifiedSet {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no previous notified proposals file found, starting fresh");
                return NotifiedSet::new();
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to read notified proposals file, starting fresh");
                return NotifiedSet::new();
            }
        };

        match serde_json::from_slice::<Vec<String>>(&raw) {
            Ok(ids) => {
                let set: NotifiedSet = ids.into_iter().collect();
                info!(path = %self.path.display(), count = set.len(), "loaded notified proposals");
                set
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "notified proposals file is corrupt, starting fresh");
                NotifiedSet::new()
            }
        }
    }

    /// Overwrite the state file with the full set.
    ///
    /// Writes a sibling temp file and renames it over the target, so an
    /// interrupted save leaves the previous state intact.
    pub async fn save(&self, ids: &NotifiedSet) -> Result<(), StoreError> {
        let json = serde_json::to_vec(&ids.iter().collect::<Vec<_>>())?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let tmp = self.tmp_path();
        if let Err(e) = self.replace_with(&tmp, &json).await {
            // Best effort; the temp file may not exist yet.
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.io_err(e));
        }

        debug!(tmp = %tmp.display(), "replaced state file");
        info!(path = %self.path.display(), count = ids.len(), "saved notified proposals");
        Ok(())
    }

    async fn replace_with(&self, tmp: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(tmp, &self.path).await
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "notified_proposals.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
