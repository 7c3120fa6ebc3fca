//! External collaborators, expressed as traits the embedder implements.
//!
//! The engine never touches the air or the firmware directly. Candidate
//! ranking, credential storage, IE parsing, admission policy and the
//! firmware message transport all live behind these seams; the engine only
//! sequences them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use wlanroam_types::{
    BssDescription, Candidate, CandidateFilter, Channel, FrameParseError, InterfaceId, MacAddress,
    ParsedBssInfo, Profile, ReasonCode, SecurityProtocol,
};

/// Verdict from the admission policy for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject(RejectReason),
}

/// Why a candidate was refused. Concurrency rejections are remembered so an
/// exhausted walk can complete with ConcurrencyBlocked instead of
/// NothingToJoin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// DBS/MCC feasibility: the candidate cannot coexist with current
    /// interface activity
    Concurrency,
    /// Regulatory/DFS ineligibility on the candidate's channel
    Regulatory,
    /// Candidate is on the reject list
    Denylisted,
}

/// Handle the key cache understands for one peer's derived material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyContext {
    pub bssid: MacAddress,
    pub security: SecurityProtocol,
}

/// Ranked-candidate supplier (the scan engine's output side).
pub trait CandidateStore: Send + Sync {
    /// Ranked candidates for the filter, best first. Queried once per
    /// connect command; retries reuse the snapshot.
    fn query(&self, filter: &CandidateFilter) -> Vec<Candidate>;
}

/// Externally owned PMK/credential cache.
pub trait KeyCache: Send + Sync {
    fn lookup(&self, bssid: MacAddress) -> Option<KeyContext>;
    fn invalidate(&self, bssid: MacAddress);
    fn install(&self, context: &KeyContext);
}

/// Information-element decoder for candidate bodies.
pub trait BssCodec: Send + Sync {
    fn parse(&self, body: &[u8]) -> Result<ParsedBssInfo, FrameParseError>;
}

/// Admission/concurrency gate consulted per candidate.
pub trait AdmissionPolicy: Send + Sync {
    fn admit(&self, bss: &BssDescription, interface_id: InterfaceId) -> Admission;

    /// Called after a firmware roam commits a new BSS so policy and
    /// hardware-mode bookkeeping can be re-derived.
    fn on_topology_change(&self, _interface_id: InterfaceId, _bss: &BssDescription) {}
}

/// Fire-and-forget firmware message transport. Acknowledgements come back
/// asynchronously through `RoamEngine::on_link_event`.
pub trait Transport: Send + Sync {
    fn send(&self, interface_id: InterfaceId, request: LinkRequest);
}

/// Requests the engine issues downward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkRequest {
    /// Associate to a candidate. `cached_key` marks that a cached
    /// credential for this BSSID was found and should be offered.
    Join {
        bss: BssDescription,
        profile: Profile,
        cached_key: bool,
    },
    /// Reassociate to an already-known BSS without tearing down first
    Reassoc { bss: BssDescription },
    Disassoc { peer: MacAddress, reason: ReasonCode },
    Deauth { peer: MacAddress, reason: ReasonCode },
    StartBss { profile: Profile },
    StopBss,
}

/// Acknowledgements and link-layer notifications delivered back into the
/// engine by the embedder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkEvent {
    JoinConfirm { status: JoinStatus },
    DisassocConfirm { peer: MacAddress },
    DeauthConfirm { peer: MacAddress },
    StartBssConfirm { bssid: MacAddress, channel: Channel },
    StartBssFailed { reason: String },
    StopBssConfirm,
    /// The external supplicant finished the post-association handshake
    KeyInstalled,
}

/// Outcome of a join/reassociate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JoinStatus {
    Success,
    /// The peer rejected our cached credential; the cache entry must be
    /// invalidated before any retry
    InvalidCredential,
    /// No association response within the lower layer's window
    AssocTimeout,
    /// Explicit refusal with an 802.11 status code
    Refused { code: u16 },
}

/// The full set of collaborators handed to the engine at construction.
#[derive(Clone)]
pub struct Platform {
    pub candidates: Arc<dyn CandidateStore>,
    pub keys: Arc<dyn KeyCache>,
    pub codec: Arc<dyn BssCodec>,
    pub transport: Arc<dyn Transport>,
    pub policy: Arc<dyn AdmissionPolicy>,
}
