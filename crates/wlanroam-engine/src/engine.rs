//! The roam engine facade.
//!
//! All state mutation happens under one engine lock; entry points do a
//! bounded amount of work and return. Completion callbacks are collected
//! under the lock and invoked after it is released, so a callback may
//! re-enter the engine without deadlocking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use wlanroam_types::{
    Candidate, CommandId, CommandStatus, EngineError, InterfaceId, MacAddress, Profile, ReasonCode,
    Result,
};

use crate::command::{CommandOrigin, Priority, QueuedCommand, RoamCommand};
use crate::config::EngineConfig;
use crate::platform::{LinkEvent, Platform};
use crate::queue::CommandQueue;
use crate::roamsync::RoamSyncEvent;
use crate::session::{LinkState, SessionArena, Substate};
use crate::timer::{TimeoutEvent, TimeoutHandle, TimeoutScheduler};

/// Per-interface completion callback.
pub type CompletionCallback = Arc<dyn Fn(CommandId, CommandStatus) + Send + Sync>;

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) platform: Platform,
    pub(crate) sessions: SessionArena,
    pub(crate) queue: CommandQueue,
    pub(crate) scheduler: Box<dyn TimeoutScheduler>,
    /// Armed per-command deadlines
    deadlines: HashMap<CommandId, TimeoutHandle>,
    callbacks: HashMap<InterfaceId, CompletionCallback>,
    /// Completions gathered under the lock, delivered after release
    ready: Vec<(Option<CompletionCallback>, CommandId, CommandStatus)>,
}

/// Connection/roaming control core. One instance owns every interface's
/// association state and serializes the commands that drive it.
pub struct RoamEngine {
    inner: Mutex<EngineInner>,
}

impl RoamEngine {
    pub fn new(
        config: EngineConfig,
        platform: Platform,
        scheduler: Box<dyn TimeoutScheduler>,
    ) -> Self {
        let sessions = SessionArena::new(config.max_interfaces);
        let queue = CommandQueue::new(config.command_pool_size);
        Self {
            inner: Mutex::new(EngineInner {
                config,
                platform,
                sessions,
                queue,
                scheduler,
                deadlines: HashMap::new(),
                callbacks: HashMap::new(),
                ready: Vec::new(),
            }),
        }
    }

    /// Run `f` under the engine lock, then deliver any completions it
    /// produced with the lock released.
    fn with_inner<R>(&self, f: impl FnOnce(&mut EngineInner) -> R) -> R {
        let (result, ready) = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut inner);
            (result, std::mem::take(&mut inner.ready))
        };
        for (callback, id, status) in ready {
            if let Some(callback) = callback {
                callback(id, status);
            }
        }
        result
    }

    /// Register an interface with the engine. The session starts Idle.
    pub fn add_interface(&self, interface_id: InterfaceId) -> Result<()> {
        self.with_inner(|inner| inner.sessions.create(interface_id).map(|_| ()))
    }

    /// Tear down an interface: every command still targeting it completes
    /// with Cancelled and its session (including the owned BSS snapshot) is
    /// released.
    pub fn remove_interface(&self, interface_id: InterfaceId) -> Result<()> {
        self.with_inner(|inner| inner.remove_interface(interface_id))
    }

    /// Associate to the best admissible candidate for the profile.
    pub fn connect(&self, interface_id: InterfaceId, profile: Profile) -> Result<CommandId> {
        self.with_inner(|inner| {
            inner.submit(
                interface_id,
                RoamCommand::Connect {
                    profile,
                    candidates: None,
                },
                Priority::Normal,
                CommandOrigin::User,
            )
        })
    }

    /// Associate against a caller-supplied candidate list, bypassing the
    /// candidate store.
    pub fn connect_with_candidates(
        &self,
        interface_id: InterfaceId,
        profile: Profile,
        candidates: Vec<Candidate>,
    ) -> Result<CommandId> {
        self.with_inner(|inner| {
            inner.submit(
                interface_id,
                RoamCommand::Connect {
                    profile,
                    candidates: Some(candidates),
                },
                Priority::Normal,
                CommandOrigin::User,
            )
        })
    }

    /// Reassociate: in place against the current AP (`None`), or against a
    /// new profile.
    pub fn reassociate(
        &self,
        interface_id: InterfaceId,
        profile: Option<Profile>,
    ) -> Result<CommandId> {
        self.with_inner(|inner| {
            inner.submit(
                interface_id,
                RoamCommand::Reassociate { profile },
                Priority::Normal,
                CommandOrigin::User,
            )
        })
    }

    /// Tear down the interface's association.
    pub fn disconnect(&self, interface_id: InterfaceId, reason: ReasonCode) -> Result<CommandId> {
        self.with_inner(|inner| {
            inner.submit(
                interface_id,
                RoamCommand::Disconnect { reason },
                Priority::Normal,
                CommandOrigin::User,
            )
        })
    }

    /// Disassociate a single peer.
    pub fn force_disassoc_peer(
        &self,
        interface_id: InterfaceId,
        peer: MacAddress,
        reason: ReasonCode,
    ) -> Result<CommandId> {
        self.with_inner(|inner| {
            inner.submit(
                interface_id,
                RoamCommand::ForceDisassocPeer { peer, reason },
                Priority::Normal,
                CommandOrigin::User,
            )
        })
    }

    /// Deauthenticate a single peer.
    pub fn force_deauth_peer(
        &self,
        interface_id: InterfaceId,
        peer: MacAddress,
        reason: ReasonCode,
    ) -> Result<CommandId> {
        self.with_inner(|inner| {
            inner.submit(
                interface_id,
                RoamCommand::ForceDeauthPeer { peer, reason },
                Priority::Normal,
                CommandOrigin::User,
            )
        })
    }

    pub fn start_ap(&self, interface_id: InterfaceId, profile: Profile) -> Result<CommandId> {
        self.with_inner(|inner| {
            inner.submit(
                interface_id,
                RoamCommand::StartAp { profile },
                Priority::Normal,
                CommandOrigin::User,
            )
        })
    }

    pub fn stop_ap(&self, interface_id: InterfaceId) -> Result<CommandId> {
        self.with_inner(|inner| {
            inner.submit(
                interface_id,
                RoamCommand::StopAp,
                Priority::Normal,
                CommandOrigin::User,
            )
        })
    }

    /// Lower-layer acknowledgement or link notification.
    pub fn on_link_event(&self, interface_id: InterfaceId, event: LinkEvent) {
        self.with_inner(|inner| {
            inner.handle_link_event(interface_id, event);
            inner.pump(interface_id);
        })
    }

    /// Unsolicited peer-initiated disassociate/deauthenticate indication.
    pub fn on_peer_disassoc_indication(
        &self,
        interface_id: InterfaceId,
        peer: MacAddress,
        reason_code: ReasonCode,
    ) {
        self.with_inner(|inner| {
            inner.handle_peer_indication(interface_id, peer, reason_code);
            inner.pump(interface_id);
        })
    }

    /// Firmware-origin roam-synch event.
    pub fn on_roam_sync_event(&self, interface_id: InterfaceId, event: RoamSyncEvent) {
        self.with_inner(|inner| {
            inner.handle_roam_sync(interface_id, event);
            inner.pump(interface_id);
        })
    }

    /// Timer expiry, delivered by the embedder's scheduler pump.
    pub fn on_timeout(&self, event: TimeoutEvent) {
        self.with_inner(|inner| inner.handle_timeout(event))
    }

    /// Register the completion callback for an interface. Replaces any
    /// previous one.
    pub fn register_completion_callback(
        &self,
        interface_id: InterfaceId,
        callback: CompletionCallback,
    ) {
        self.with_inner(|inner| {
            inner.callbacks.insert(interface_id, callback);
        })
    }

    /// Current (state, substate) of an interface.
    pub fn link_state(&self, interface_id: InterfaceId) -> Result<(LinkState, Substate)> {
        self.with_inner(|inner| {
            let session = inner.sessions.get(interface_id)?;
            Ok((session.state(), session.substate()))
        })
    }

    /// BSSID the interface is associated to, if any.
    pub fn connected_bssid(&self, interface_id: InterfaceId) -> Result<Option<MacAddress>> {
        self.with_inner(|inner| Ok(inner.sessions.get(interface_id)?.connected_bssid()))
    }

    /// Whether the session still owns a cached BSS snapshot.
    pub fn has_cached_bss(&self, interface_id: InterfaceId) -> Result<bool> {
        self.with_inner(|inner| Ok(inner.sessions.get(interface_id)?.cached_bss.is_some()))
    }

    /// Per-interface disconnect counters.
    pub fn disconnect_stats(
        &self,
        interface_id: InterfaceId,
    ) -> Result<wlanroam_types::DisconnectStats> {
        self.with_inner(|inner| Ok(inner.sessions.get(interface_id)?.stats))
    }

    /// True while a firmware roam holds off host-initiated scans for the
    /// interface. The external scan engine consults this.
    pub fn scans_suppressed(&self, interface_id: InterfaceId) -> Result<bool> {
        self.with_inner(|inner| Ok(inner.sessions.get(interface_id)?.scan_suppressed))
    }
}

/// Forward due timeouts from a [`crate::timer::TokioTimeoutScheduler`]
/// receiver into the engine until the channel closes.
pub fn spawn_timeout_pump(
    engine: Arc<RoamEngine>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<TimeoutEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            engine.on_timeout(event);
        }
    })
}

impl EngineInner {
    /// Submission path shared by the facade and internally synthesized
    /// commands. De-duplicates redundant teardown requests, enqueues, and
    /// pumps the interface.
    pub(crate) fn submit(
        &mut self,
        interface_id: InterfaceId,
        command: RoamCommand,
        priority: Priority,
        origin: CommandOrigin,
    ) -> Result<CommandId> {
        if !self.sessions.contains(interface_id) {
            return Err(EngineError::NoSuchInterface(interface_id));
        }

        match &command {
            // A disconnect while one is already in flight: one teardown on
            // the air, but the duplicate still gets its own (Cancelled)
            // completion.
            RoamCommand::Disconnect { .. } if self.queue.has_disconnect(interface_id) => {
                let id = self.queue.allocate_id();
                info!(
                    "duplicate disconnect coalesced: iface={} {}",
                    interface_id, id
                );
                self.push_completion(interface_id, id, CommandStatus::Cancelled);
                return Ok(id);
            }
            // A forced teardown for a peer that is already being torn down
            // (locally or via a peer indication) folds onto the existing
            // command: one teardown, one completion.
            RoamCommand::ForceDisassocPeer { peer, .. }
            | RoamCommand::ForceDeauthPeer { peer, .. } => {
                if let Some(existing) = self.queue.find_teardown_for_peer(interface_id, *peer) {
                    info!(
                        "teardown for {} coalesced onto {}: iface={}",
                        peer, existing, interface_id
                    );
                    return Ok(existing);
                }
            }
            _ => {}
        }

        let id = self.queue.allocate_id();
        let timeout = command.kind().timeout(&self.config);
        info!(
            "command submitted: iface={} {} kind={}",
            interface_id,
            id,
            command.kind().name()
        );
        self.queue.submit(QueuedCommand {
            id,
            interface_id,
            command,
            priority,
            origin,
            timeout,
            cursor: None,
        })?;
        self.pump(interface_id);
        Ok(id)
    }

    /// Activate and dispatch commands for the interface until one stays
    /// active (awaiting a lower-layer acknowledgement) or the pending list
    /// drains. Only this method activates commands.
    pub(crate) fn pump(&mut self, interface_id: InterfaceId) {
        while let Some(id) = self.queue.try_activate(interface_id) {
            if let Ok(session) = self.sessions.get_mut(interface_id) {
                session.pending_command = Some(id);
            }
            self.arm_deadline(interface_id, id);
            self.dispatch_active(interface_id);
        }
    }

    fn arm_deadline(&mut self, interface_id: InterfaceId, command_id: CommandId) {
        let Some(active) = self.queue.active(interface_id) else {
            return;
        };
        let handle = self.scheduler.schedule(
            TimeoutEvent::CommandDeadline {
                interface_id,
                command_id,
            },
            active.timeout,
        );
        self.deadlines.insert(command_id, handle);
    }

    fn cancel_deadline(&mut self, command_id: CommandId) {
        if let Some(handle) = self.deadlines.remove(&command_id) {
            self.scheduler.cancel(handle);
        }
    }

    /// Route a freshly activated command to its handler.
    fn dispatch_active(&mut self, interface_id: InterfaceId) {
        let Some(kind) = self.queue.active(interface_id).map(|c| c.kind()) else {
            return;
        };
        use crate::command::CommandKind::*;
        match kind {
            Connect => self.start_connect(interface_id),
            Reassociate => self.start_reassociate(interface_id),
            Disconnect => self.start_disconnect(interface_id),
            ForceDisassoc | ForceDeauth => self.start_force_teardown(interface_id),
            StartAp => self.start_ap(interface_id),
            StopAp => self.start_stop_ap(interface_id),
        }
    }

    /// Finish the interface's active command exactly once: release it,
    /// disarm its deadline, and stage the caller's completion.
    pub(crate) fn complete_active(&mut self, interface_id: InterfaceId, status: CommandStatus) {
        let Some(command) = self.queue.remove_active(interface_id) else {
            warn!(
                "completion with no active command: iface={} status={:?}",
                interface_id, status
            );
            return;
        };
        self.cancel_deadline(command.id);
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.pending_command = None;
        }
        info!(
            "command complete: iface={} {} kind={} status={:?}",
            interface_id,
            command.id,
            command.kind().name(),
            status
        );
        self.push_completion(interface_id, command.id, status);

        // Releasing a globally exclusive command may unblock other
        // interfaces' queues.
        if command.kind().globally_exclusive() {
            for other in self.queue.interfaces_with_pending() {
                if other != interface_id {
                    self.pump(other);
                }
            }
        }
    }

    /// Stage a completion for delivery once the engine lock is released.
    /// The callback is resolved now so completions survive callback
    /// deregistration and interface teardown ordering.
    pub(crate) fn push_completion(
        &mut self,
        interface_id: InterfaceId,
        command_id: CommandId,
        status: CommandStatus,
    ) {
        let callback = self.callbacks.get(&interface_id).cloned();
        self.ready.push((callback, command_id, status));
    }

    fn remove_interface(&mut self, interface_id: InterfaceId) -> Result<()> {
        if !self.sessions.contains(interface_id) {
            return Err(EngineError::NoSuchInterface(interface_id));
        }
        let drained = self.queue.drain_interface(interface_id);
        let had_exclusive = drained.iter().any(|c| c.kind().globally_exclusive());
        for command in drained {
            self.cancel_deadline(command.id);
            self.push_completion(interface_id, command.id, CommandStatus::Cancelled);
        }
        self.cancel_roam_watchdog(interface_id);
        self.sessions.destroy(interface_id)?;
        self.callbacks.remove(&interface_id);
        if had_exclusive {
            for other in self.queue.interfaces_with_pending() {
                self.pump(other);
            }
        }
        Ok(())
    }

    fn handle_timeout(&mut self, event: TimeoutEvent) {
        match event {
            TimeoutEvent::CommandDeadline {
                interface_id,
                command_id,
            } => {
                // A stale deadline for an already-completed command is
                // ignored.
                if self.queue.active_id(interface_id) != Some(command_id) {
                    return;
                }
                warn!(
                    "command deadline expired: iface={} {}",
                    interface_id, command_id
                );
                let force_peer = self
                    .queue
                    .active(interface_id)
                    .and_then(|c| c.command.teardown_peer());
                if let Ok(session) = self.sessions.get_mut(interface_id) {
                    if session.state() == LinkState::Joining {
                        // A teardown already on the air cannot be
                        // un-sent, and its late confirm is dropped. The
                        // link must not be presumed alive in that case.
                        let torn_down = match session.substate() {
                            Substate::DisassocRequest
                            | Substate::DisassocHandoff
                            | Substate::StopBssRequest => true,
                            Substate::DisassocForced | Substate::DeauthRequest => {
                                force_peer.is_some() && force_peer == session.connected_bssid()
                            }
                            _ => false,
                        };
                        if torn_down {
                            session.clear_link();
                        } else {
                            let settled = if session.connected_profile.is_some() {
                                LinkState::Joined
                            } else {
                                LinkState::Idle
                            };
                            session.set_state(settled);
                        }
                    }
                }
                self.complete_active(interface_id, CommandStatus::TimedOut);
                self.pump(interface_id);
            }
            TimeoutEvent::RoamWatchdog { interface_id } => {
                self.handle_roam_watchdog(interface_id);
                self.pump(interface_id);
            }
        }
    }

    fn handle_link_event(&mut self, interface_id: InterfaceId, event: LinkEvent) {
        match event {
            LinkEvent::JoinConfirm { status } => self.handle_join_confirm(interface_id, status),
            LinkEvent::DisassocConfirm { peer } => {
                if self.handoff_in_progress(interface_id) {
                    self.handle_handoff_confirm(interface_id, peer);
                } else {
                    self.handle_disassoc_confirm(interface_id, peer);
                }
            }
            LinkEvent::DeauthConfirm { peer } => self.handle_deauth_confirm(interface_id, peer),
            LinkEvent::StartBssConfirm { bssid, channel } => {
                self.handle_start_bss_confirm(interface_id, bssid, channel)
            }
            LinkEvent::StartBssFailed { reason } => {
                self.handle_start_bss_failed(interface_id, reason)
            }
            LinkEvent::StopBssConfirm => self.handle_stop_bss_confirm(interface_id),
            LinkEvent::KeyInstalled => self.handle_key_installed(interface_id),
        }
    }

    fn handle_key_installed(&mut self, interface_id: InterfaceId) {
        let Ok(session) = self.sessions.get_mut(interface_id) else {
            warn!("key install for unknown interface {}", interface_id);
            return;
        };
        if session.substate() == Substate::WaitForKey {
            session.set_state(LinkState::Joined);
        }
    }
}
