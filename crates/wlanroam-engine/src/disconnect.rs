//! Local disconnects, forced per-peer teardowns, and unsolicited
//! peer-initiated indications.

use tracing::{debug, info, warn};

use wlanroam_types::{CommandStatus, DisconnectCause, InterfaceId, MacAddress, ReasonCode};

use crate::command::{CommandKind, CommandOrigin, Priority, RoamCommand};
use crate::engine::EngineInner;
use crate::platform::LinkRequest;
use crate::roamsync::RoamSyncState;
use crate::session::{LinkState, Substate};

impl EngineInner {
    /// Dispatch entry for an activated Disconnect command.
    pub(crate) fn start_disconnect(&mut self, interface_id: InterfaceId) {
        let reason = match self.queue.active(interface_id).map(|c| &c.command) {
            Some(RoamCommand::Disconnect { reason }) => *reason,
            _ => return,
        };
        let peer = match self.sessions.get(interface_id) {
            Ok(session) => session.connected_bssid(),
            Err(_) => {
                self.complete_active(
                    interface_id,
                    CommandStatus::Failed {
                        reason: "interface gone".to_string(),
                    },
                );
                return;
            }
        };
        let Some(peer) = peer else {
            // Nothing on the air; the teardown is trivially done.
            self.complete_active(
                interface_id,
                CommandStatus::Disconnected {
                    cause: DisconnectCause::LocalRequest,
                },
            );
            return;
        };
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.enter_joining(Substate::DisassocRequest);
        }
        self.platform
            .transport
            .send(interface_id, LinkRequest::Disassoc { peer, reason });
    }

    /// Dispatch entry for an activated ForceDisassocPeer/ForceDeauthPeer
    /// command.
    pub(crate) fn start_force_teardown(&mut self, interface_id: InterfaceId) {
        let (peer, reason, deauth) = match self.queue.active(interface_id).map(|c| &c.command) {
            Some(RoamCommand::ForceDisassocPeer { peer, reason }) => (*peer, *reason, false),
            Some(RoamCommand::ForceDeauthPeer { peer, reason }) => (*peer, *reason, true),
            _ => return,
        };
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.enter_joining(if deauth {
                Substate::DeauthRequest
            } else {
                Substate::DisassocForced
            });
        }
        let request = if deauth {
            LinkRequest::Deauth { peer, reason }
        } else {
            LinkRequest::Disassoc { peer, reason }
        };
        self.platform.transport.send(interface_id, request);
    }

    pub(crate) fn handle_disassoc_confirm(&mut self, interface_id: InterfaceId, peer: MacAddress) {
        self.finish_teardown(interface_id, peer);
    }

    pub(crate) fn handle_deauth_confirm(&mut self, interface_id: InterfaceId, peer: MacAddress) {
        self.finish_teardown(interface_id, peer);
    }

    /// A teardown request we put on the air has been acknowledged.
    fn finish_teardown(&mut self, interface_id: InterfaceId, peer: MacAddress) {
        let Some(active) = self.queue.active(interface_id) else {
            warn!(
                "teardown confirm for {} with no active command: iface={}",
                peer, interface_id
            );
            return;
        };
        let kind = active.kind();
        let origin = active.origin;
        let reason = match &active.command {
            RoamCommand::Disconnect { reason }
            | RoamCommand::ForceDisassocPeer { reason, .. }
            | RoamCommand::ForceDeauthPeer { reason, .. } => *reason,
            _ => {
                warn!(
                    "teardown confirm for {} during {}: iface={}",
                    peer,
                    kind.name(),
                    interface_id
                );
                return;
            }
        };

        match kind {
            CommandKind::Disconnect => {
                if let Ok(session) = self.sessions.get_mut(interface_id) {
                    session.stats.record(DisconnectCause::LocalRequest);
                    session.clear_link();
                }
                self.complete_active(
                    interface_id,
                    CommandStatus::Disconnected {
                        cause: DisconnectCause::LocalRequest,
                    },
                );
            }
            CommandKind::ForceDisassoc | CommandKind::ForceDeauth => {
                if let Ok(session) = self.sessions.get_mut(interface_id) {
                    if session.connected_bssid() == Some(peer) {
                        session.clear_link();
                    } else {
                        // Kicking an AP-mode client leaves our own link as
                        // it was.
                        let settled = if session.connected_profile.is_some() {
                            LinkState::Joined
                        } else {
                            LinkState::Idle
                        };
                        session.set_state(settled);
                    }
                }
                let status = if origin == CommandOrigin::PeerIndication {
                    // Stats were recorded when the indication arrived.
                    CommandStatus::PeerDisconnected {
                        peer,
                        cause: DisconnectCause::classify(reason),
                    }
                } else {
                    if let Ok(session) = self.sessions.get_mut(interface_id) {
                        session.stats.record(DisconnectCause::LocalRequest);
                    }
                    CommandStatus::Disconnected {
                        cause: DisconnectCause::LocalRequest,
                    }
                };
                self.complete_active(interface_id, status);
            }
            _ => {
                warn!(
                    "unexpected teardown confirm for {} during {}: iface={}",
                    peer,
                    kind.name(),
                    interface_id
                );
            }
        }
    }

    /// An unsolicited disassociate/deauthenticate arrived from a peer. For
    /// our own AP the link is already gone; for an AP-mode client we still
    /// confirm the departure over the air via an internal command.
    pub(crate) fn handle_peer_indication(
        &mut self,
        interface_id: InterfaceId,
        peer: MacAddress,
        reason: ReasonCode,
    ) {
        let Ok(session) = self.sessions.get(interface_id) else {
            warn!("peer indication for unknown interface {}", interface_id);
            return;
        };
        let own_ap = session.connected_bssid() == Some(peer);

        // A teardown for this peer is already on the books; the indication
        // adds nothing, not even a counter bump.
        if self.queue.find_teardown_for_peer(interface_id, peer).is_some()
            || (own_ap && self.queue.has_disconnect(interface_id))
        {
            debug!(
                "peer indication for {} superseded by queued teardown: iface={}",
                peer, interface_id
            );
            return;
        }

        let cause = DisconnectCause::classify(reason);
        info!(
            "peer {} disconnected us ({:?}, reason {}): iface={}",
            peer, cause, reason.0, interface_id
        );
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.stats.record(cause);
        }

        if own_ap {
            let roaming = self
                .sessions
                .get(interface_id)
                .map(|s| !matches!(s.roam, RoamSyncState::Idle))
                .unwrap_or(false);
            if roaming {
                self.finish_roam(interface_id);
            }
            if let Ok(session) = self.sessions.get_mut(interface_id) {
                session.clear_link();
            }
            // No command, no transport traffic: just report the loss.
            let id = self.queue.allocate_id();
            self.push_completion(
                interface_id,
                id,
                CommandStatus::PeerDisconnected { peer, cause },
            );
        } else if let Err(err) = self.submit(
            interface_id,
            RoamCommand::ForceDeauthPeer { peer, reason },
            Priority::Normal,
            CommandOrigin::PeerIndication,
        ) {
            warn!(
                "failed to queue teardown for departed peer {}: iface={} err={}",
                peer, interface_id, err
            );
        }
    }
}
