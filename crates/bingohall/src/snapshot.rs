//! Save and restore the in-memory store and wallet across restarts.

use std::path::Path;

use bingohall_room::{MemoryWallet, RoomStore, StoreSnapshot, WalletSnapshot};
use serde::{Deserialize, Serialize};

use crate::HallError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallSnapshot {
    pub store: StoreSnapshot,
    pub wallet: WalletSnapshot,
}

impl HallSnapshot {
    pub async fn capture(store: &RoomStore, wallet: &MemoryWallet) -> Self {
        Self {
            store: store.snapshot().await,
            wallet: wallet.snapshot().await,
        }
    }

    /// Reads a snapshot. A missing file is `Ok(None)`, not an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, HallError> {
        let path = path.as_ref();
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_str(&json)
            .map_err(|e| HallError::Snapshot(format!("{}: {e}", path.display())))?;
        Ok(Some(snapshot))
    }

    /// Writes the snapshot next to `path` and renames it into place, so a
    /// crash mid-write leaves the previous file intact.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), HallError> {
        let path = path.as_ref();
        let json =
            serde_json::to_vec_pretty(self).map_err(|e| HallError::Snapshot(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        tracing::info!(
            path = %path.display(),
            rooms = self.store.rooms.len(),
            ledger_rows = self.wallet.ledger.len(),
            "snapshot saved"
        );
        Ok(())
    }
}
