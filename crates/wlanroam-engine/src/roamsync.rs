//! Firmware roam-synch coordinator.
//!
//! Some firmware roams autonomously and only tells the host afterwards, as
//! a short event sequence. The coordinator replays that sequence into the
//! session store so host state catches up with what the radio already did,
//! while the command queue stays paused and host scans are held off. A
//! watchdog bounds how long a stuck sequence can wedge the interface.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use wlanroam_types::{BssDescription, ConnectedProfile, InterfaceId, ReasonCode};

use crate::command::{CommandOrigin, Priority, RoamCommand};
use crate::engine::EngineInner;
use crate::platform::KeyContext;
use crate::session::{LinkState, Substate};
use crate::timer::{TimeoutEvent, TimeoutHandle};

/// Where the new link stands when firmware hands it over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamAuthStatus {
    /// Fully authenticated; the link is usable as-is
    Authenticated,
    /// Associated but the key handshake still has to run on the host
    ConnectedPendingKey,
}

/// Host-visible events of one firmware roam, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoamSyncEvent {
    /// Firmware left the old BSS and is bringing up a new one
    Start,
    /// The old peer's host-side bookkeeping can be dropped
    DeregisterOldPeer,
    /// Description of the BSS firmware landed on
    SyncPropagation {
        bss: BssDescription,
        auth: RoamAuthStatus,
    },
    /// The sequence is done; commit the propagated BSS
    SyncComplete,
    /// Firmware abandoned the roam; the old link stands
    Abort,
    /// The roam invocation itself failed in firmware
    InvokeFail { user_initiated: bool },
}

/// Coordinator state, one per session.
#[derive(Debug, Clone)]
pub enum RoamSyncState {
    Idle,
    InProgress {
        /// Propagated BSS waiting for SyncComplete
        pending: Option<(BssDescription, RoamAuthStatus)>,
        watchdog: TimeoutHandle,
    },
}

impl EngineInner {
    pub(crate) fn handle_roam_sync(&mut self, interface_id: InterfaceId, event: RoamSyncEvent) {
        match event {
            RoamSyncEvent::Start => self.roam_start(interface_id),
            RoamSyncEvent::DeregisterOldPeer => {
                let Ok(session) = self.sessions.get_mut(interface_id) else {
                    return;
                };
                if matches!(session.roam, RoamSyncState::Idle) {
                    warn!("roam deregister outside a roam: iface={}", interface_id);
                    return;
                }
                session.twt_pending = false;
            }
            RoamSyncEvent::SyncPropagation { bss, auth } => {
                let Ok(session) = self.sessions.get_mut(interface_id) else {
                    return;
                };
                let RoamSyncState::InProgress { pending, .. } = &mut session.roam else {
                    warn!("roam propagation outside a roam: iface={}", interface_id);
                    return;
                };
                debug!(
                    "roam propagated {} ({:?}): iface={}",
                    bss.bssid, auth, interface_id
                );
                *pending = Some((bss, auth));
            }
            RoamSyncEvent::SyncComplete => self.roam_complete(interface_id),
            RoamSyncEvent::Abort => {
                info!("firmware roam aborted: iface={}", interface_id);
                self.finish_roam(interface_id);
            }
            RoamSyncEvent::InvokeFail { user_initiated } => {
                warn!(
                    "firmware roam invoke failed (user_initiated={}): iface={}",
                    user_initiated, interface_id
                );
                self.finish_roam(interface_id);
                if user_initiated {
                    // The user asked for this roam; the link is suspect, so
                    // tear it down ahead of anything already queued.
                    if let Err(err) = self.submit(
                        interface_id,
                        RoamCommand::Disconnect {
                            reason: ReasonCode::UNSPECIFIED,
                        },
                        Priority::High,
                        CommandOrigin::Internal,
                    ) {
                        warn!(
                            "failed to queue post-roam disconnect: iface={} err={}",
                            interface_id, err
                        );
                    }
                }
            }
        }
    }

    fn roam_start(&mut self, interface_id: InterfaceId) {
        let EngineInner {
            queue,
            sessions,
            scheduler,
            config,
            ..
        } = self;
        let Ok(session) = sessions.get_mut(interface_id) else {
            warn!("roam start for unknown interface {}", interface_id);
            return;
        };
        if session.state() != LinkState::Joined {
            warn!(
                "roam start while {}: iface={}",
                session.state().name(),
                interface_id
            );
            return;
        }
        if !matches!(session.roam, RoamSyncState::Idle) {
            warn!("roam start while a roam is in flight: iface={}", interface_id);
            return;
        }

        info!("firmware roam started: iface={}", interface_id);
        let watchdog = scheduler.schedule(
            TimeoutEvent::RoamWatchdog { interface_id },
            config.roam_watchdog,
        );
        session.roam = RoamSyncState::InProgress {
            pending: None,
            watchdog,
        };
        session.scan_suppressed = true;
        queue.pause(interface_id);
    }

    fn roam_complete(&mut self, interface_id: InterfaceId) {
        let pending = match self.sessions.get_mut(interface_id) {
            Ok(session) => match &mut session.roam {
                RoamSyncState::InProgress { pending, .. } => pending.take(),
                RoamSyncState::Idle => {
                    warn!("roam complete outside a roam: iface={}", interface_id);
                    return;
                }
            },
            Err(_) => return,
        };
        let Some((bss, auth)) = pending else {
            // Complete without a propagated BSS is unusable; treat it as an
            // abort and keep the old link.
            warn!("roam complete without propagation: iface={}", interface_id);
            self.finish_roam(interface_id);
            return;
        };

        info!(
            "firmware roam committed {} ({:?}): iface={}",
            bss.bssid, auth, interface_id
        );
        self.platform.keys.install(&KeyContext {
            bssid: bss.bssid,
            security: bss.security,
        });
        self.platform.policy.on_topology_change(interface_id, &bss);

        if let Ok(session) = self.sessions.get_mut(interface_id) {
            if session.twt_pending {
                // Firmware skipped DeregisterOldPeer; the old peer's TWT
                // agreements die with the old link regardless.
                warn!(
                    "roam committed without deregistering the old peer: iface={}",
                    interface_id
                );
            }
            session.twt_pending = true;
            session.connected_profile = Some(ConnectedProfile {
                ssid: bss.ssid.clone(),
                bssid: bss.bssid,
                security: bss.security,
                channel: bss.channel,
            });
            session.cached_bss = Some(bss);
            match auth {
                RoamAuthStatus::Authenticated => session.set_state(LinkState::Joined),
                RoamAuthStatus::ConnectedPendingKey => {
                    session.enter_joining(Substate::WaitForKey)
                }
            }
        }
        self.finish_roam(interface_id);
    }

    /// Terminal for every roam outcome: disarm the watchdog, lift scan
    /// suppression and resume the command queue. Link state is whatever the
    /// outcome left behind.
    pub(crate) fn finish_roam(&mut self, interface_id: InterfaceId) {
        let EngineInner {
            queue,
            sessions,
            scheduler,
            ..
        } = self;
        let Ok(session) = sessions.get_mut(interface_id) else {
            return;
        };
        if let RoamSyncState::InProgress { watchdog, .. } = session.roam {
            scheduler.cancel(watchdog);
        }
        session.roam = RoamSyncState::Idle;
        session.scan_suppressed = false;
        queue.resume(interface_id);
    }

    /// Watchdog expiry: the sequence stalled, abandon it.
    pub(crate) fn handle_roam_watchdog(&mut self, interface_id: InterfaceId) {
        let stalled = self
            .sessions
            .get(interface_id)
            .map(|s| matches!(s.roam, RoamSyncState::InProgress { .. }))
            .unwrap_or(false);
        if !stalled {
            return;
        }
        warn!("firmware roam watchdog expired: iface={}", interface_id);
        self.finish_roam(interface_id);
    }

    /// Interface teardown path: make sure no watchdog outlives the session.
    pub(crate) fn cancel_roam_watchdog(&mut self, interface_id: InterfaceId) {
        let Ok(session) = self.sessions.get(interface_id) else {
            return;
        };
        if let RoamSyncState::InProgress { watchdog, .. } = session.roam {
            self.scheduler.cancel(watchdog);
        }
    }
}
