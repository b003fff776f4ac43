//! Identity, money, and game-setting types shared by every layer.
//!
//! These travel on the wire and are stored in room records, so each one
//! derives `Serialize`/`Deserialize` with the exact JSON spelling clients
//! use (`"75"`, `"in_progress"`, `"fullcard"`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A platform user, as issued by the auth layer.
///
/// Newtype over `u64` so a `UserId` can never be passed where a `RoomId`
/// or `CardId` is expected. `#[serde(transparent)]` keeps the JSON form a
/// bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Internal room identity (the primary key of the room record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Identity of a single purchased card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub u64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// The human-shareable room code players type in to join.
///
/// Always [`RoomCode::LEN`] characters from [`RoomCode::ALPHABET`], which
/// leaves out characters that are easy to confuse when read aloud
/// (`0/O`, `1/I`). Decoding normalizes to uppercase and rejects anything
/// else, so a `RoomCode` value is valid by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Length of every room code.
    pub const LEN: usize = 6;

    /// Characters a room code may contain.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    /// Parses and normalizes user input into a room code.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let code = input.trim().to_ascii_uppercase();
        if code.len() != Self::LEN {
            return Err(ProtocolError::InvalidRoomCode(input.to_string()));
        }
        if !code.bytes().all(|b| Self::ALPHABET.contains(&b)) {
            return Err(ProtocolError::InvalidRoomCode(input.to_string()));
        }
        Ok(Self(code))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// A currency amount in minor units.
///
/// Integer arithmetic keeps the pot conservation invariant exact: prize
/// shares are floored and the platform fee takes the remainder, so
/// `winner + host + fee == pot` always holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(pub u64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Returns `true` for a zero amount.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition. `None` on overflow.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Checked subtraction. `None` if `rhs > self`.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Checked multiplication by a count (e.g. cards × cost).
    pub fn checked_mul(self, count: u32) -> Option<Amount> {
        self.0.checked_mul(u64::from(count)).map(Amount)
    }

    /// `pct` percent of this amount, rounded down.
    pub fn percent(self, pct: u8) -> Amount {
        Amount((u128::from(self.0) * u128::from(pct) / 100) as u64)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.map(|a| a.0).sum())
    }
}

/// Which wallet balance a room is priced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Soft currency earned in-app.
    Coins,
    /// Purchased currency.
    Stars,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coins => f.write_str("coins"),
            Self::Stars => f.write_str("stars"),
        }
    }
}

// ---------------------------------------------------------------------------
// Game settings
// ---------------------------------------------------------------------------

/// The two supported bingo variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    /// 5×5 card, numbers 1–75, FREE center.
    #[serde(rename = "75")]
    Seventy5,
    /// 3×9 card, numbers 1–90, five numbers per row.
    #[serde(rename = "90")]
    Ninety,
}

impl GameMode {
    /// The highest number that can be drawn in this mode.
    pub fn max_number(self) -> u8 {
        match self {
            Self::Seventy5 => 75,
            Self::Ninety => 90,
        }
    }

    /// Card dimensions as `(rows, cols)`.
    pub fn dimensions(self) -> (usize, usize) {
        match self {
            Self::Seventy5 => (5, 5),
            Self::Ninety => (3, 9),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seventy5 => f.write_str("75"),
            Self::Ninety => f.write_str("90"),
        }
    }
}

/// The winning shape a claimed card must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Any complete row, column, or (75-ball) diagonal.
    Line,
    /// The four corner cells.
    Corners,
    /// Every numbered cell on the card.
    #[serde(rename = "fullcard")]
    FullCard,
}

impl FromStr for PatternType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "corners" => Ok(Self::Corners),
            "fullcard" | "full_card" => Ok(Self::FullCard),
            other => Err(ProtocolError::UnknownPattern(other.to_string())),
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line => f.write_str("line"),
            Self::Corners => f.write_str("corners"),
            Self::FullCard => f.write_str("fullcard"),
        }
    }
}

// ---------------------------------------------------------------------------
// Room lifecycle
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Waiting ──start──→ InProgress ──win──→ Finished
///    │                   │
///    └──────cancel───────┴──────────────→ Cancelled
/// ```
///
/// `Finished` and `Cancelled` are terminal: nothing but audit logging
/// happens to a room after it reaches either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Finished,
    Cancelled,
}

impl RoomStatus {
    /// Returns `true` if players may still buy in.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` once the room can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::InProgress => f.write_str("in_progress"),
            Self::Finished => f.write_str("finished"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Who triggered a cancellation or refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Host,
    Admin,
    System,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Admin => f.write_str("admin"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Reason code written to every refund record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The host closed an empty waiting room.
    HostClosed,
    /// An admin closed the room or forced a refund.
    AdminForced,
    /// The failure detector found the room stalled.
    Timeout,
    /// The room was left in progress across a restart.
    ServerRestart,
    /// The host disconnected and did not come back in time.
    HostDisconnected,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostClosed => f.write_str("host_closed"),
            Self::AdminForced => f.write_str("admin_forced"),
            Self::Timeout => f.write_str("timeout"),
            Self::ServerRestart => f.write_str("server_restart"),
            Self::HostDisconnected => f.write_str("host_disconnected"),
        }
    }
}

/// Why the failure detector flagged a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    /// No activity at all for the inactivity timeout.
    Inactive,
    /// Auto-call is off and nothing happened for the manual-host timeout.
    HostAbsent,
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => f.write_str("inactive"),
            Self::HostAbsent => f.write_str("host_absent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_parse_normalizes_case() {
        let code = RoomCode::parse(" abc234 ").unwrap();
        assert_eq!(code.as_str(), "ABC234");
    }

    #[test]
    fn test_room_code_rejects_ambiguous_and_wrong_length() {
        assert!(RoomCode::parse("ABCDE0").is_err()); // '0' not in alphabet
        assert!(RoomCode::parse("ABCDEI").is_err()); // 'I' not in alphabet
        assert!(RoomCode::parse("ABCDE").is_err());
        assert!(RoomCode::parse("ABCDEFG").is_err());
    }

    #[test]
    fn test_room_code_deserialize_validates() {
        let ok: RoomCode = serde_json::from_str("\"xyz789\"").unwrap();
        assert_eq!(ok.to_string(), "XYZ789");
        assert!(serde_json::from_str::<RoomCode>("\"nope\"").is_err());
    }

    #[test]
    fn test_amount_percent_floors() {
        assert_eq!(Amount(20).percent(70), Amount(14));
        assert_eq!(Amount(20).percent(20), Amount(4));
        assert_eq!(Amount(15).percent(70), Amount(10));
        assert_eq!(Amount(u64::MAX).percent(100), Amount(u64::MAX));
    }

    #[test]
    fn test_amount_checked_ops() {
        assert_eq!(Amount(10).checked_mul(3), Some(Amount(30)));
        assert_eq!(Amount(5).checked_sub(Amount(6)), None);
        assert_eq!(Amount(u64::MAX).checked_add(Amount(1)), None);
        let total: Amount = [Amount(1), Amount(2), Amount(3)].into_iter().sum();
        assert_eq!(total, Amount(6));
    }

    #[test]
    fn test_game_mode_wire_names() {
        assert_eq!(serde_json::to_string(&GameMode::Seventy5).unwrap(), "\"75\"");
        assert_eq!(serde_json::from_str::<GameMode>("\"90\"").unwrap(), GameMode::Ninety);
        assert_eq!(GameMode::Ninety.max_number(), 90);
        assert_eq!(GameMode::Ninety.dimensions(), (3, 9));
    }

    #[test]
    fn test_pattern_type_parse() {
        assert_eq!("LINE".parse::<PatternType>().unwrap(), PatternType::Line);
        assert_eq!("fullcard".parse::<PatternType>().unwrap(), PatternType::FullCard);
        assert!(matches!(
            "diamond".parse::<PatternType>(),
            Err(ProtocolError::UnknownPattern(_))
        ));
        assert_eq!(serde_json::to_string(&PatternType::FullCard).unwrap(), "\"fullcard\"");
    }

    #[test]
    fn test_room_status_predicates() {
        assert!(RoomStatus::Waiting.is_joinable());
        assert!(!RoomStatus::InProgress.is_joinable());
        assert!(RoomStatus::Finished.is_terminal());
        assert!(RoomStatus::Cancelled.is_terminal());
        assert!(!RoomStatus::InProgress.is_terminal());
        assert_eq!(
            serde_json::to_string(&RoomStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
