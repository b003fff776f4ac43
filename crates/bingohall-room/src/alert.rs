//! Outbound notifications for failures an operator should see.
//!
//! Delivery is fire-and-forget. A sink that cannot deliver must swallow
//! the failure; gameplay and sweeps never wait on it.

use std::fmt;

use bingohall_protocol::RoomCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub severity: Severity,
    pub room: Option<RoomCode>,
    pub summary: String,
}

impl Alert {
    pub fn critical(room: Option<RoomCode>, summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            room,
            summary: summary.into(),
        }
    }

    pub fn warning(room: Option<RoomCode>, summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            room,
            summary: summary.into(),
        }
    }
}

/// Where alerts go: a pager, an admin chat, a log.
pub trait AlertSink: Send + Sync + 'static {
    fn alert(&self, alert: Alert);
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn alert(&self, alert: Alert) {
        let room = alert.room.as_ref().map(RoomCode::as_str).unwrap_or("-");
        match alert.severity {
            Severity::Critical => {
                tracing::error!(room_code = room, severity = %alert.severity, "{}", alert.summary)
            }
            Severity::Warning => {
                tracing::warn!(room_code = room, severity = %alert.severity, "{}", alert.summary)
            }
        }
    }
}
