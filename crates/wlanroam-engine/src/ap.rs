//! AP (BSS) lifecycle: start and stop a hosted network on an interface.

use tracing::warn;

use wlanroam_types::{
    BssDescription, Channel, CommandStatus, ConnectedProfile, InterfaceId, MacAddress,
};

use crate::command::{CommandKind, RoamCommand};
use crate::engine::EngineInner;
use crate::platform::LinkRequest;
use crate::session::{LinkState, Substate};

impl EngineInner {
    /// Dispatch entry for an activated StartAp command.
    pub(crate) fn start_ap(&mut self, interface_id: InterfaceId) {
        let profile = match self.queue.active(interface_id).map(|c| &c.command) {
            Some(RoamCommand::StartAp { profile }) => profile.clone(),
            _ => return,
        };
        let busy = match self.sessions.get(interface_id) {
            Ok(session) => session.connected_profile.is_some(),
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
        if busy {
            self.complete_active(
                interface_id,
                CommandStatus::Failed {
                    reason: "interface busy".to_string(),
                },
            );
            return;
        }
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.enter_joining(Substate::Config);
        }
        self.platform
            .transport
            .send(interface_id, LinkRequest::StartBss { profile });
    }

    pub(crate) fn handle_start_bss_confirm(
        &mut self,
        interface_id: InterfaceId,
        bssid: MacAddress,
        channel: Channel,
    ) {
        let profile = match self.queue.active(interface_id).map(|c| &c.command) {
            Some(RoamCommand::StartAp { profile }) => profile.clone(),
            _ => {
                warn!(
                    "start-bss confirm without an active start_ap: iface={}",
                    interface_id
                );
                return;
            }
        };
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.connected_profile = Some(ConnectedProfile {
                ssid: profile.ssid.clone(),
                bssid,
                security: profile.security,
                channel,
            });
            session.cached_bss = Some(BssDescription {
                bssid,
                ssid: profile.ssid,
                channel,
                security: profile.security,
                signal_dbm: 0,
            });
            session.set_state(LinkState::Joined);
        }
        self.complete_active(interface_id, CommandStatus::ApStarted { bssid });
    }

    pub(crate) fn handle_start_bss_failed(&mut self, interface_id: InterfaceId, reason: String) {
        if self.queue.active(interface_id).map(|c| c.kind()) != Some(CommandKind::StartAp) {
            warn!(
                "start-bss failure without an active start_ap: iface={}",
                interface_id
            );
            return;
        }
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.set_state(LinkState::Idle);
        }
        self.complete_active(interface_id, CommandStatus::Failed { reason });
    }

    /// Dispatch entry for an activated StopAp command.
    pub(crate) fn start_stop_ap(&mut self, interface_id: InterfaceId) {
        let serving = self
            .sessions
            .get(interface_id)
            .map(|s| s.connected_profile.is_some())
            .unwrap_or(false);
        if !serving {
            self.complete_active(interface_id, CommandStatus::ApStopped);
            return;
        }
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.enter_joining(Substate::StopBssRequest);
        }
        self.platform
            .transport
            .send(interface_id, LinkRequest::StopBss);
    }

    pub(crate) fn handle_stop_bss_confirm(&mut self, interface_id: InterfaceId) {
        if self.queue.active(interface_id).map(|c| c.kind()) != Some(CommandKind::StopAp) {
            warn!(
                "stop-bss confirm without an active stop_ap: iface={}",
                interface_id
            );
            return;
        }
        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.clear_link();
        }
        self.complete_active(interface_id, CommandStatus::ApStopped);
    }
}
