//! Command identifiers, completion statuses and disconnect bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mac::MacAddress;

/// One virtual network device instance managed by the engine. Sessions live
/// in a fixed-capacity arena indexed by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceId(pub u8);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// Monotonic identifier for a submitted roam command. Also allocated for
/// synthesized completions (peer-indicated link-down) so every completion a
/// caller observes carries a distinct id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// 802.11 reason code as carried by disassociation/deauthentication.
/// Only the handful the engine classifies get named constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReasonCode(pub u16);

impl ReasonCode {
    /// Unspecified reason
    pub const UNSPECIFIED: ReasonCode = ReasonCode(1);
    /// Disassociated due to inactivity
    pub const INACTIVITY: ReasonCode = ReasonCode(4);
    /// AP unable to handle all associated stations (kickout)
    pub const AP_OVERLOAD: ReasonCode = ReasonCode(5);
    /// Class-3 frame from a non-associated station
    pub const CLASS3_FRAME: ReasonCode = ReasonCode(7);
    /// Driver-synthesized code for lost beacons (not an over-the-air value)
    pub const BEACON_LOSS: ReasonCode = ReasonCode(0);
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reason={}", self.0)
    }
}

/// Why a link went down, as classified for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectCause {
    /// Local command (disconnect, forced disassoc/deauth, AP stop)
    LocalRequest,
    /// Peer shed us for capacity reasons
    PeerKickout,
    /// Peer timed us out for inactivity
    Inactivity,
    /// Lost the AP's beacons
    BeaconLoss,
    /// Explicit deauthentication/disassociation from the peer
    ExplicitDeauth,
}

impl DisconnectCause {
    /// Classify a peer-indicated teardown by its reason code.
    pub fn classify(reason: ReasonCode) -> Self {
        match reason {
            ReasonCode::BEACON_LOSS => DisconnectCause::BeaconLoss,
            ReasonCode::INACTIVITY => DisconnectCause::Inactivity,
            ReasonCode::AP_OVERLOAD => DisconnectCause::PeerKickout,
            _ => DisconnectCause::ExplicitDeauth,
        }
    }
}

/// Per-interface disconnect counters, split by classified cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectStats {
    pub local: u64,
    pub peer_kickout: u64,
    pub inactivity: u64,
    pub beacon_loss: u64,
    pub explicit_deauth: u64,
}

impl DisconnectStats {
    /// Bump the counter for one observed teardown.
    pub fn record(&mut self, cause: DisconnectCause) {
        match cause {
            DisconnectCause::LocalRequest => self.local += 1,
            DisconnectCause::PeerKickout => self.peer_kickout += 1,
            DisconnectCause::Inactivity => self.inactivity += 1,
            DisconnectCause::BeaconLoss => self.beacon_loss += 1,
            DisconnectCause::ExplicitDeauth => self.explicit_deauth += 1,
        }
    }

    /// Total teardowns observed
    pub fn total(&self) -> u64 {
        self.local + self.peer_kickout + self.inactivity + self.beacon_loss + self.explicit_deauth
    }
}

/// Result of a completed (or synthesized) command, delivered through the
/// per-interface completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandStatus {
    /// Connect/reassociate succeeded against this BSS
    Associated { bssid: MacAddress },
    /// Local teardown finished
    Disconnected { cause: DisconnectCause },
    /// Peer-indicated link-down, never backed by a submitted command
    PeerDisconnected {
        peer: MacAddress,
        cause: DisconnectCause,
    },
    /// AP brought up on this BSSID
    ApStarted { bssid: MacAddress },
    /// AP torn down
    ApStopped,
    /// Removed from the queue before dispatch (duplicate, or interface gone)
    Cancelled,
    /// Candidate query returned nothing
    NoCandidates,
    /// Candidates existed but every one was rejected or failed
    NothingToJoin,
    /// A candidate existed but a concurrency constraint blocked it; the
    /// caller may re-queue once the constraint clears
    ConcurrencyBlocked,
    /// Every candidate failed IE parsing
    MalformedCandidate,
    /// The command exceeded its deadline while active
    TimedOut,
    /// Lower-layer failure not covered above
    Failed { reason: String },
}

impl CommandStatus {
    /// True for outcomes the caller should treat as success.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CommandStatus::Associated { .. }
                | CommandStatus::Disconnected { .. }
                | CommandStatus::ApStarted { .. }
                | CommandStatus::ApStopped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_classification() {
        assert_eq!(
            DisconnectCause::classify(ReasonCode::INACTIVITY),
            DisconnectCause::Inactivity
        );
        assert_eq!(
            DisconnectCause::classify(ReasonCode::AP_OVERLOAD),
            DisconnectCause::PeerKickout
        );
        assert_eq!(
            DisconnectCause::classify(ReasonCode::BEACON_LOSS),
            DisconnectCause::BeaconLoss
        );
        assert_eq!(
            DisconnectCause::classify(ReasonCode(99)),
            DisconnectCause::ExplicitDeauth
        );
    }

    #[test]
    fn test_stats_record() {
        let mut stats = DisconnectStats::default();
        stats.record(DisconnectCause::Inactivity);
        stats.record(DisconnectCause::Inactivity);
        stats.record(DisconnectCause::LocalRequest);
        assert_eq!(stats.inactivity, 2);
        assert_eq!(stats.local, 1);
        assert_eq!(stats.total(), 3);
    }
}
