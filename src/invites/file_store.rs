use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::allocator::{ClaimOutcome, InviteStore};
use super::csv::{is_valid_code, parse_pool_csv};
use crate::error::AppError;

/// On-disk assignment state, rewritten as a whole on every claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentsFile {
    #[serde(default)]
    pub by_token_id: BTreeMap<String, String>,
    #[serde(default)]
    pub used_codes: Vec<String>,
}

/// Invite pool kept in two files: a read-only CSV of codes and a JSON
/// document of assignments.
///
/// Claims are serialized through one mutex per store, and the JSON is
/// replaced by rename so a crash mid-write leaves the previous document.
/// Only one process may own the files.
#[derive(Clone)]
pub struct FileInviteStore {
    pool_path: PathBuf,
    state_path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileInviteStore {
    pub fn new(pool_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            pool_path: pool_path.into(),
            state_path: state_path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_state(&self) -> Result<AssignmentsFile, AppError> {
        match tokio::fs::read(&self.state_path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(AssignmentsFile::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt assignments file {}", self.state_path.display()))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AssignmentsFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_state(&self, state: &AssignmentsFile) -> Result<(), AppError> {
        if let Some(parent) = self.state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path(&self.state_path);
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.state_path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    /// Pool codes in file order, minus the ones the CSV already marks as consumed.
    async fn load_pool(&self) -> Result<Vec<String>, AppError> {
        let text = match tokio::fs::read_to_string(&self.pool_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.pool_path.display(), "invite pool file missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_pool_csv(&text)
            .into_iter()
            .filter(|row| row.consumer.is_none() && is_valid_code(&row.code))
            .map(|row| row.code)
            .collect())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

impl InviteStore for FileInviteStore {
    async fn find_assignment(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.load_state().await?.by_token_id.get(key).cloned())
    }

    async fn try_claim(&self, key: &str, _meta: Option<&str>) -> Result<ClaimOutcome, AppError> {
        let _guard = self.lock.lock().await;

        let mut state = self.load_state().await?;
        if state.by_token_id.contains_key(key) {
            // assigned between the caller's lookup and this lock
            return Ok(ClaimOutcome::Contended);
        }

        let pool = self.load_pool().await?;
        let free = {
            let taken: HashSet<&str> = state
                .used_codes
                .iter()
                .chain(state.by_token_id.values())
                .map(String::as_str)
                .collect();
            pool.into_iter().find(|code| !taken.contains(code.as_str()))
        };
        let Some(code) = free else {
            return Ok(ClaimOutcome::Exhausted);
        };

        state.by_token_id.insert(key.to_string(), code.clone());
        state.used_codes.push(code.clone());
        self.save_state(&state).await?;
        Ok(ClaimOutcome::Claimed(code))
    }
}
