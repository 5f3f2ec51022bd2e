use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    domain::{UserId, UserRecord},
    Result,
};

/// Hexagonal port for the persistence backend.
///
/// The contract is durability-before-acknowledgment: `save` must have the
/// record on stable storage before it returns `Ok`.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Full state snapshot, read once at startup.
    async fn load_all(&self) -> Result<HashMap<UserId, UserRecord>>;

    /// Durably persist the full current record for one user.
    async fn save(&self, user_id: UserId, record: &UserRecord) -> Result<()>;
}
