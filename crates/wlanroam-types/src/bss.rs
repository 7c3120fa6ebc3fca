//! BSS snapshots and join candidates.

use serde::{Deserialize, Serialize};

use crate::mac::MacAddress;
use crate::profile::{Channel, ChannelPolicy, SecurityProtocol, Ssid};

/// Fully described BSS, as committed into a session once a candidate has
/// been parsed and joined (or delivered by a firmware roam).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BssDescription {
    pub bssid: MacAddress,
    pub ssid: Ssid,
    pub channel: Channel,
    pub security: SecurityProtocol,
    /// Signal strength at scan time, dBm
    pub signal_dbm: i8,
}

/// Fields the frame codec recovers from a candidate's raw IE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBssInfo {
    pub ssid: Ssid,
    pub security: SecurityProtocol,
    pub channel: Channel,
}

/// One ranked entry from the candidate store. The IE body stays raw until
/// the join orchestrator asks the codec for it; a body that fails to parse
/// disqualifies the candidate, not the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub bssid: MacAddress,
    pub channel: Channel,
    /// Ranking score assigned by the candidate store, higher is better
    pub score: u8,
    /// Signal strength at scan time, dBm
    pub signal_dbm: i8,
    /// Raw information-element body for the codec
    pub body: Vec<u8>,
}

/// Filter handed to the candidate store when a connect command carries no
/// fixed candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub ssid: Ssid,
    pub security: SecurityProtocol,
    pub channel_policy: ChannelPolicy,
}
