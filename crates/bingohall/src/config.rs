//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bingohall_room::{DetectorConfig, GameRules};
use bingohall_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::HallError;

/// Everything the server reads at startup. Every field has a default, so
/// a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HallConfig {
    pub bind_addr: String,
    /// A connection that sends nothing for this long is closed.
    pub idle_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    /// Where the store and wallet are saved on shutdown. `None` disables
    /// snapshots.
    pub snapshot_path: Option<PathBuf>,
    pub rules: GameRules,
    pub detector: DetectorConfig,
    pub session: SessionConfig,
}

impl Default for HallConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            idle_timeout_secs: 30,
            handshake_timeout_secs: 5,
            snapshot_path: None,
            rules: GameRules::default(),
            detector: DetectorConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl HallConfig {
    pub fn from_json_str(json: &str) -> Result<Self, HallError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| HallError::Config(e.to_string()))?;
        Ok(config.validated())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, HallError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| HallError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn with_rules(mut self, rules: GameRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs.max(1))
    }

    fn validated(mut self) -> Self {
        self.rules = self.rules.validated();
        self
    }
}
