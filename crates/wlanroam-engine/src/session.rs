//! Per-interface session store.
//!
//! Sessions live in a fixed-capacity arena indexed by `InterfaceId`; no
//! references escape it. All mutation happens on the command dispatch path
//! or in the indication handlers, under the engine lock.

use tracing::{debug, warn};

use wlanroam_types::{
    BssDescription, CommandId, ConnectedProfile, DisconnectStats, EngineError, InterfaceId, Result,
};

use crate::roamsync::RoamSyncState;

/// Top-level association state of one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Interface exists but is shut down
    Stopped,
    /// Up, not associated, no work in flight
    Idle,
    /// A join, teardown or AP transition is in progress
    Joining,
    /// Associated (station) or beaconing (AP)
    Joined,
}

impl LinkState {
    pub fn name(self) -> &'static str {
        match self {
            LinkState::Stopped => "stopped",
            LinkState::Idle => "idle",
            LinkState::Joining => "joining",
            LinkState::Joined => "joined",
        }
    }
}

/// Phase within `LinkState::Joining`. Meaningless in any other state;
/// leaving Joining resets this to None first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substate {
    None,
    /// Join/reassociate request outstanding
    JoinRequest,
    /// Association accepted, committing the new link
    Config,
    /// Local disconnect's disassociation outstanding
    DisassocRequest,
    /// Forced per-peer disassociation outstanding
    DisassocForced,
    /// Disassociating the old BSS before joining a new one
    DisassocHandoff,
    /// Forced deauthentication outstanding
    DeauthRequest,
    /// AP teardown outstanding
    StopBssRequest,
    /// Associated, waiting for the external key handshake to finish
    WaitForKey,
}

impl Substate {
    pub fn name(self) -> &'static str {
        match self {
            Substate::None => "none",
            Substate::JoinRequest => "join_request",
            Substate::Config => "config",
            Substate::DisassocRequest => "disassoc_request",
            Substate::DisassocForced => "disassoc_forced",
            Substate::DisassocHandoff => "disassoc_handoff",
            Substate::DeauthRequest => "deauth_request",
            Substate::StopBssRequest => "stop_bss_request",
            Substate::WaitForKey => "wait_for_key",
        }
    }
}

/// Authoritative association state for one interface.
#[derive(Debug)]
pub struct Session {
    pub interface_id: InterfaceId,
    state: LinkState,
    substate: Substate,
    /// Snapshot of the network currently joined/served
    pub connected_profile: Option<ConnectedProfile>,
    /// Last-connected BSS snapshot, exclusively owned by the session
    pub cached_bss: Option<BssDescription>,
    /// Weak reference to the command currently active for this interface;
    /// lookup-only, the queue owns the command
    pub pending_command: Option<CommandId>,
    /// The associated peer holds negotiated protocol state (TWT
    /// agreements). Set on association, cleared when a firmware roam
    /// deregisters the old peer or the link clears.
    pub twt_pending: bool,
    /// Host-initiated scans are held off while a firmware roam is in flight
    pub scan_suppressed: bool,
    /// Firmware roam-synch coordinator state
    pub roam: RoamSyncState,
    pub stats: DisconnectStats,
}

impl Session {
    fn new(interface_id: InterfaceId) -> Self {
        Self {
            interface_id,
            state: LinkState::Idle,
            substate: Substate::None,
            connected_profile: None,
            cached_bss: None,
            pending_command: None,
            twt_pending: false,
            scan_suppressed: false,
            roam: RoamSyncState::Idle,
            stats: DisconnectStats::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn substate(&self) -> Substate {
        self.substate
    }

    /// Transition the top-level state. Leaving Joining always clears the
    /// substate first so `substate != None` implies `state == Joining` at
    /// every observable instant.
    pub fn set_state(&mut self, new: LinkState) {
        if self.state == LinkState::Joining && new != LinkState::Joining {
            self.set_substate(Substate::None);
        }
        if self.state != new {
            debug!(
                "session transition: iface={} state {} -> {}",
                self.interface_id,
                self.state.name(),
                new.name()
            );
            self.state = new;
        }
    }

    /// Transition the joining substate. Only meaningful while Joining.
    pub fn set_substate(&mut self, new: Substate) {
        if new != Substate::None && self.state != LinkState::Joining {
            warn!(
                "session transition: iface={} substate {} requested outside joining (state={})",
                self.interface_id,
                new.name(),
                self.state.name()
            );
        }
        if self.substate != new {
            debug!(
                "session transition: iface={} substate {} -> {}",
                self.interface_id,
                self.substate.name(),
                new.name()
            );
            self.substate = new;
        }
    }

    /// Move into Joining with the given substate (ordering: state first).
    pub fn enter_joining(&mut self, substate: Substate) {
        self.set_state(LinkState::Joining);
        self.set_substate(substate);
    }

    /// Forget the association entirely and settle in Idle.
    pub fn clear_link(&mut self) {
        self.set_state(LinkState::Idle);
        self.connected_profile = None;
        self.cached_bss = None;
        self.twt_pending = false;
    }

    /// BSSID of the currently connected AP, if any.
    pub fn connected_bssid(&self) -> Option<wlanroam_types::MacAddress> {
        self.connected_profile.as_ref().map(|p| p.bssid)
    }
}

/// Fixed-capacity arena of sessions, indexed by interface id.
#[derive(Debug)]
pub struct SessionArena {
    slots: Vec<Option<Session>>,
}

impl SessionArena {
    pub fn new(max_interfaces: usize) -> Self {
        let mut slots = Vec::with_capacity(max_interfaces);
        slots.resize_with(max_interfaces, || None);
        Self { slots }
    }

    pub fn create(&mut self, interface_id: InterfaceId) -> Result<&mut Session> {
        let index = interface_id.0 as usize;
        if index >= self.slots.len() {
            return Err(EngineError::TooManyInterfaces(self.slots.len()));
        }
        if self.slots[index].is_some() {
            return Err(EngineError::InterfaceExists(interface_id));
        }
        debug!("session created: iface={}", interface_id);
        Ok(self.slots[index].insert(Session::new(interface_id)))
    }

    /// Remove the session, releasing its owned BSS snapshot. The caller is
    /// responsible for failing commands that still target the interface
    /// before destroying it.
    pub fn destroy(&mut self, interface_id: InterfaceId) -> Result<Session> {
        let index = interface_id.0 as usize;
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(EngineError::NoSuchInterface(interface_id))?;
        let mut session = slot.take().ok_or(EngineError::NoSuchInterface(interface_id))?;
        session.set_state(LinkState::Stopped);
        debug!("session destroyed: iface={}", interface_id);
        Ok(session)
    }

    pub fn get(&self, interface_id: InterfaceId) -> Result<&Session> {
        self.slots
            .get(interface_id.0 as usize)
            .and_then(|s| s.as_ref())
            .ok_or(EngineError::NoSuchInterface(interface_id))
    }

    pub fn get_mut(&mut self, interface_id: InterfaceId) -> Result<&mut Session> {
        self.slots
            .get_mut(interface_id.0 as usize)
            .and_then(|s| s.as_mut())
            .ok_or(EngineError::NoSuchInterface(interface_id))
    }

    pub fn contains(&self, interface_id: InterfaceId) -> bool {
        self.get(interface_id).is_ok()
    }
}
