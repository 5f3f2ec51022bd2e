//! JSON-file persistence backend.
//!
//! Implements the `habito-core` storage port over a single JSON document.
//! Writes go through a sibling temp file + rename, so a crash mid-write
//! leaves the previous state intact.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use habito_core::{
    domain::{UserId, UserRecord},
    errors::Error,
    storage::StoragePort,
    Result,
};

/// On-disk document: every user keyed by decimal id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    saved_at: String,
    #[serde(default)]
    users: HashMap<String, UserRecord>,
}

pub struct JsonFileStore {
    path: PathBuf,
    // Mirror of the on-disk map, so saving one user can rewrite the whole
    // document without consulting the core.
    state: Mutex<HashMap<UserId, UserRecord>>,
}

impl JsonFileStore {
    /// Open the store, reading existing state if the file is present.
    ///
    /// A missing or empty file is an empty state. An unparseable file is a
    /// storage error: refusing to start beats silently overwriting user data.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let users = read_state(&path)?;
        tracing::info!(
            file = %path.display(),
            users = users.len(),
            "loaded habit state"
        );
        Ok(Self {
            path,
            state: Mutex::new(users),
        })
    }
}

#[async_trait]
impl StoragePort for JsonFileStore {
    async fn load_all(&self) -> Result<HashMap<UserId, UserRecord>> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, user_id: UserId, record: &UserRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(user_id, record.clone());
        write_state(&self.path, &state)
    }
}

fn read_state(path: &Path) -> Result<HashMap<UserId, UserRecord>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let txt = fs::read_to_string(path).map_err(|e| storage_err(path, e))?;
    if txt.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let file: StateFile = serde_json::from_str(&txt).map_err(|e| storage_err(path, e))?;

    let mut users = HashMap::new();
    for (key, record) in file.users {
        let id = key.parse::<i64>().map_err(|_| {
            Error::Storage(format!("{}: invalid user id key: {key}", path.display()))
        })?;
        users.insert(UserId(id), record);
    }
    Ok(users)
}

fn write_state(path: &Path, users: &HashMap<UserId, UserRecord>) -> Result<()> {
    let file = StateFile {
        saved_at: chrono::Utc::now().to_rfc3339(),
        users: users
            .iter()
            .map(|(id, rec)| (id.0.to_string(), rec.clone()))
            .collect(),
    };
    let json = serde_json::to_vec_pretty(&file).map_err(|e| storage_err(path, e))?;

    // Atomic replace: the document is only ever swapped in whole.
    let tmp = tmp_path(path);
    {
        let mut f = fs::File::create(&tmp).map_err(|e| storage_err(&tmp, e))?;
        f.write_all(&json).map_err(|e| storage_err(&tmp, e))?;
        f.sync_all().map_err(|e| storage_err(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| storage_err(path, e))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn storage_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {e}", path.display()))
}
