//! Roam commands as queued and dispatched by the serializer.

use std::time::Duration;

use wlanroam_types::{Candidate, CommandId, InterfaceId, MacAddress, Profile, ReasonCode};

use crate::config::EngineConfig;
use crate::join::ConnectCursor;

/// The tagged union of everything the engine can be asked to do. Each
/// variant carries only the fields it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoamCommand {
    /// Associate to the best admissible candidate for the profile. A fixed
    /// candidate list bypasses the candidate store query.
    Connect {
        profile: Profile,
        candidates: Option<Vec<Candidate>>,
    },
    /// Tear down the interface's association
    Disconnect { reason: ReasonCode },
    /// Disassociate one peer (AP mode, or targeted station teardown)
    ForceDisassocPeer { peer: MacAddress, reason: ReasonCode },
    /// Deauthenticate one peer
    ForceDeauthPeer { peer: MacAddress, reason: ReasonCode },
    /// `None`: reassociate to the current AP in place. `Some`: candidate
    /// walk against a new profile.
    Reassociate { profile: Option<Profile> },
    StartAp { profile: Profile },
    StopAp,
}

impl RoamCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            RoamCommand::Connect { .. } => CommandKind::Connect,
            RoamCommand::Disconnect { .. } => CommandKind::Disconnect,
            RoamCommand::ForceDisassocPeer { .. } => CommandKind::ForceDisassoc,
            RoamCommand::ForceDeauthPeer { .. } => CommandKind::ForceDeauth,
            RoamCommand::Reassociate { .. } => CommandKind::Reassociate,
            RoamCommand::StartAp { .. } => CommandKind::StartAp,
            RoamCommand::StopAp => CommandKind::StopAp,
        }
    }

    /// Peer a forced teardown targets, for indication de-duplication.
    pub fn teardown_peer(&self) -> Option<MacAddress> {
        match self {
            RoamCommand::ForceDisassocPeer { peer, .. }
            | RoamCommand::ForceDeauthPeer { peer, .. } => Some(*peer),
            _ => None,
        }
    }
}

/// Discriminant used for queue policy (timeouts, exclusivity, matching).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Connect,
    Disconnect,
    ForceDisassoc,
    ForceDeauth,
    Reassociate,
    StartAp,
    StopAp,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Connect => "connect",
            CommandKind::Disconnect => "disconnect",
            CommandKind::ForceDisassoc => "force_disassoc",
            CommandKind::ForceDeauth => "force_deauth",
            CommandKind::Reassociate => "reassociate",
            CommandKind::StartAp => "start_ap",
            CommandKind::StopAp => "stop_ap",
        }
    }

    /// AP lifecycle commands serialize system-wide: the shared radio has
    /// one AP context.
    pub fn globally_exclusive(self) -> bool {
        matches!(self, CommandKind::StartAp | CommandKind::StopAp)
    }

    /// Commands that tear a link down.
    pub fn is_teardown(self) -> bool {
        matches!(
            self,
            CommandKind::Disconnect
                | CommandKind::ForceDisassoc
                | CommandKind::ForceDeauth
                | CommandKind::StopAp
        )
    }

    pub fn timeout(self, config: &EngineConfig) -> Duration {
        match self {
            CommandKind::Connect | CommandKind::Reassociate => config.connect_timeout,
            CommandKind::Disconnect | CommandKind::ForceDisassoc | CommandKind::ForceDeauth => {
                config.disconnect_timeout
            }
            CommandKind::StartAp | CommandKind::StopAp => config.ap_timeout,
        }
    }
}

/// Queue insertion priority. High is reserved for teardown caused by
/// interface destruction and roam-invoke failure; it jumps the pending
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

/// Who asked for this command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    /// The application/user facade
    User,
    /// Synthesized from an unsolicited peer indication
    PeerIndication,
    /// Synthesized by the engine itself (roam invoke-fail teardown)
    Internal,
}

/// A command as owned by the queue from submission to completion.
#[derive(Debug)]
pub struct QueuedCommand {
    pub id: CommandId,
    pub interface_id: InterfaceId,
    pub command: RoamCommand,
    pub priority: Priority,
    pub origin: CommandOrigin,
    pub timeout: Duration,
    /// Candidate-walk state; populated only while a Connect/Reassociate is
    /// active
    pub(crate) cursor: Option<ConnectCursor>,
}

impl QueuedCommand {
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}
