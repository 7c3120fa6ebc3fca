//! Shared fakes and fixture plumbing for the engine integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wlanroam_engine::platform::{
    Admission, AdmissionPolicy, BssCodec, CandidateStore, KeyCache, KeyContext, LinkRequest,
    Platform, RejectReason, Transport,
};
use wlanroam_engine::timer::ManualTimeoutScheduler;
use wlanroam_engine::{EngineConfig, RoamEngine};
use wlanroam_types::{
    Band, BssDescription, Candidate, CandidateFilter, Channel, CommandId, CommandStatus,
    FrameParseError, InterfaceId, MacAddress, ParsedBssInfo, SecurityProtocol, Ssid,
};

pub fn mac(last: u8) -> MacAddress {
    MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, last])
}

pub fn chan(number: u8) -> Channel {
    Channel::new(number, Band::TwoGhz)
}

fn security_tag(security: SecurityProtocol) -> u8 {
    match security {
        SecurityProtocol::Open => 0,
        SecurityProtocol::Wpa2Personal => 1,
        SecurityProtocol::Wpa3Personal => 2,
        SecurityProtocol::Wpa2Enterprise => 3,
    }
}

fn band_tag(band: Band) -> u8 {
    match band {
        Band::TwoGhz => 0,
        Band::FiveGhz => 1,
        Band::SixGhz => 2,
    }
}

/// Encode an IE body in the toy format `FakeCodec` understands.
pub fn ie_body(ssid: &str, security: SecurityProtocol, channel: Channel) -> Vec<u8> {
    let mut body = vec![security_tag(security), channel.number, band_tag(channel.band)];
    body.extend_from_slice(ssid.as_bytes());
    body
}

pub fn candidate(
    bssid: MacAddress,
    ssid: &str,
    security: SecurityProtocol,
    channel: Channel,
    score: u8,
) -> Candidate {
    Candidate {
        bssid,
        channel,
        score,
        signal_dbm: -55,
        body: ie_body(ssid, security, channel),
    }
}

pub fn malformed_candidate(bssid: MacAddress, channel: Channel, score: u8) -> Candidate {
    Candidate {
        bssid,
        channel,
        score,
        signal_dbm: -55,
        body: vec![0xff],
    }
}

#[derive(Default)]
pub struct FakeCandidateStore {
    candidates: Mutex<Vec<Candidate>>,
}

impl FakeCandidateStore {
    pub fn set(&self, candidates: Vec<Candidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }
}

impl CandidateStore for FakeCandidateStore {
    fn query(&self, _filter: &CandidateFilter) -> Vec<Candidate> {
        self.candidates.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeKeyCache {
    keys: Mutex<HashMap<MacAddress, KeyContext>>,
    invalidations: Mutex<Vec<MacAddress>>,
}

impl FakeKeyCache {
    pub fn preload(&self, context: KeyContext) {
        self.keys.lock().unwrap().insert(context.bssid, context);
    }

    pub fn contains(&self, bssid: MacAddress) -> bool {
        self.keys.lock().unwrap().contains_key(&bssid)
    }

    pub fn invalidations(&self) -> Vec<MacAddress> {
        self.invalidations.lock().unwrap().clone()
    }
}

impl KeyCache for FakeKeyCache {
    fn lookup(&self, bssid: MacAddress) -> Option<KeyContext> {
        self.keys.lock().unwrap().get(&bssid).cloned()
    }

    fn invalidate(&self, bssid: MacAddress) {
        self.keys.lock().unwrap().remove(&bssid);
        self.invalidations.lock().unwrap().push(bssid);
    }

    fn install(&self, context: &KeyContext) {
        self.keys.lock().unwrap().insert(context.bssid, context.clone());
    }
}

/// Decodes the toy IE format from [`ie_body`]: security tag, channel
/// number, band tag, then ssid bytes.
pub struct FakeCodec;

impl BssCodec for FakeCodec {
    fn parse(&self, body: &[u8]) -> Result<ParsedBssInfo, FrameParseError> {
        if body.len() < 3 {
            return Err(FrameParseError::Truncated(body.len()));
        }
        let security = match body[0] {
            0 => SecurityProtocol::Open,
            1 => SecurityProtocol::Wpa2Personal,
            2 => SecurityProtocol::Wpa3Personal,
            3 => SecurityProtocol::Wpa2Enterprise,
            other => {
                return Err(FrameParseError::UnsupportedSecurity(format!(
                    "tag {other}"
                )))
            }
        };
        let band = match body[2] {
            0 => Band::TwoGhz,
            1 => Band::FiveGhz,
            2 => Band::SixGhz,
            _ => return Err(FrameParseError::Malformed("bad band tag".to_string())),
        };
        Ok(ParsedBssInfo {
            ssid: Ssid(body[3..].to_vec()),
            security,
            channel: Channel::new(body[1], band),
        })
    }
}

#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<(InterfaceId, LinkRequest)>>,
}

impl FakeTransport {
    /// Drain everything sent so far, in order.
    pub fn take(&self) -> Vec<(InterfaceId, LinkRequest)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(InterfaceId, LinkRequest)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl Transport for FakeTransport {
    fn send(&self, interface_id: InterfaceId, request: LinkRequest) {
        self.sent.lock().unwrap().push((interface_id, request));
    }
}

/// Admits everything except BSSIDs given an explicit rejection.
#[derive(Default)]
pub struct FakePolicy {
    rejects: Mutex<HashMap<MacAddress, RejectReason>>,
    topology_changes: Mutex<Vec<(InterfaceId, MacAddress)>>,
}

impl FakePolicy {
    pub fn reject(&self, bssid: MacAddress, reason: RejectReason) {
        self.rejects.lock().unwrap().insert(bssid, reason);
    }

    pub fn topology_changes(&self) -> Vec<(InterfaceId, MacAddress)> {
        self.topology_changes.lock().unwrap().clone()
    }
}

impl AdmissionPolicy for FakePolicy {
    fn admit(&self, bss: &BssDescription, _interface_id: InterfaceId) -> Admission {
        match self.rejects.lock().unwrap().get(&bss.bssid) {
            Some(reason) => Admission::Reject(*reason),
            None => Admission::Admit,
        }
    }

    fn on_topology_change(&self, interface_id: InterfaceId, bss: &BssDescription) {
        self.topology_changes
            .lock()
            .unwrap()
            .push((interface_id, bss.bssid));
    }
}

/// Everything a scenario needs: the engine, the fakes behind it, the manual
/// clock, and the completions observed per interface.
pub struct Fixture {
    pub engine: RoamEngine,
    pub candidates: Arc<FakeCandidateStore>,
    pub keys: Arc<FakeKeyCache>,
    pub transport: Arc<FakeTransport>,
    pub policy: Arc<FakePolicy>,
    pub scheduler: ManualTimeoutScheduler,
    completions: Arc<Mutex<Vec<(CommandId, CommandStatus)>>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let candidates = Arc::new(FakeCandidateStore::default());
        let keys = Arc::new(FakeKeyCache::default());
        let transport = Arc::new(FakeTransport::default());
        let policy = Arc::new(FakePolicy::default());
        let scheduler = ManualTimeoutScheduler::new();
        let platform = Platform {
            candidates: candidates.clone(),
            keys: keys.clone(),
            codec: Arc::new(FakeCodec),
            transport: transport.clone(),
            policy: policy.clone(),
        };
        let engine = RoamEngine::new(config, platform, Box::new(scheduler.clone()));
        Self {
            engine,
            candidates,
            keys,
            transport,
            policy,
            scheduler,
            completions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register an interface and capture its completions in submission
    /// order.
    pub fn add_interface(&self, interface_id: InterfaceId) {
        self.engine.add_interface(interface_id).unwrap();
        let sink = self.completions.clone();
        self.engine.register_completion_callback(
            interface_id,
            Arc::new(move |id, status| {
                sink.lock().unwrap().push((id, status));
            }),
        );
    }

    /// Completions observed so far, across all interfaces.
    pub fn completions(&self) -> Vec<(CommandId, CommandStatus)> {
        self.completions.lock().unwrap().clone()
    }

    /// Take every completion observed so far, leaving the log empty.
    /// Setup helpers call this so tests count only their own completions.
    pub fn drain_completions(&self) -> Vec<(CommandId, CommandStatus)> {
        std::mem::take(&mut *self.completions.lock().unwrap())
    }

    /// Status delivered for one command id, if it completed.
    pub fn status_of(&self, id: CommandId) -> Option<CommandStatus> {
        self.completions
            .lock()
            .unwrap()
            .iter()
            .find(|(done, _)| *done == id)
            .map(|(_, status)| status.clone())
    }

    /// Fire the oldest armed timeout into the engine.
    pub fn fire_timeout(&self) {
        let event = self.scheduler.fire_oldest().expect("a timeout is armed");
        self.engine.on_timeout(event);
    }
}
