//! Join orchestrator: candidate walk, admission, handoff, bounded retries.
//!
//! Cursor state for the walk lives in the active Connect/Reassociate
//! command and dies with it. The walk itself never blocks; each step either
//! issues one transport request and waits for its confirm, or completes the
//! command.

use tracing::{debug, warn};

use wlanroam_types::{
    BssDescription, Candidate, CandidateFilter, ChannelPolicy, CommandStatus, ConnectedProfile,
    DisconnectCause, InterfaceId, MacAddress, Profile, ReasonCode,
};

use crate::command::RoamCommand;
use crate::engine::EngineInner;
use crate::platform::{Admission, JoinStatus, LinkRequest, RejectReason};
use crate::session::{LinkState, Substate};

/// Which acknowledgement the walk is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinStep {
    /// Examining candidates, nothing on the air
    Selecting,
    /// Disassociating the old BSS before joining the new one
    Handoff,
    /// Join request outstanding
    AwaitJoin,
    /// Reassociation request outstanding
    AwaitReassoc,
}

/// Mutable state of one candidate walk.
#[derive(Debug)]
pub(crate) struct ConnectCursor {
    pub profile: Profile,
    candidates: Vec<Candidate>,
    index: usize,
    /// Same-candidate retries left after credential rejections
    credential_retries_left: u32,
    /// Same-candidate retries left after association timeouts
    assoc_retries_left: u32,
    /// Candidates whose IE body failed to parse
    malformed: usize,
    /// A concurrency rejection occurred somewhere in the walk
    saw_concurrency_reject: bool,
    /// The interface held an association when the walk began
    was_connected: bool,
    pub(crate) step: JoinStep,
    pub(crate) target: Option<BssDescription>,
}

impl ConnectCursor {
    pub(crate) fn new(profile: Profile, candidates: Vec<Candidate>, was_connected: bool) -> Self {
        Self {
            profile,
            candidates,
            index: 0,
            credential_retries_left: 0,
            assoc_retries_left: 0,
            malformed: 0,
            saw_concurrency_reject: false,
            was_connected,
            step: JoinStep::Selecting,
            target: None,
        }
    }

    fn next_candidate(&mut self) {
        self.index += 1;
        self.step = JoinStep::Selecting;
        self.target = None;
    }
}

enum Action {
    Wait,
    Complete(CommandStatus),
    Advance,
}

impl EngineInner {
    /// Dispatch entry for an activated Connect (or new-profile
    /// Reassociate) command.
    pub(crate) fn start_connect(&mut self, interface_id: InterfaceId) {
        let Some(active) = self.queue.active(interface_id) else {
            return;
        };
        let (profile, fixed) = match &active.command {
            RoamCommand::Connect {
                profile,
                candidates,
            } => (profile.clone(), candidates.clone()),
            RoamCommand::Reassociate {
                profile: Some(profile),
            } => (profile.clone(), None),
            _ => return,
        };

        let Ok(session) = self.sessions.get(interface_id) else {
            self.complete_active(
                interface_id,
                CommandStatus::Failed {
                    reason: "interface gone".to_string(),
                },
            );
            return;
        };
        let was_connected = session.connected_profile.is_some();

        let mut candidates = match fixed {
            Some(list) => list,
            None => {
                let filter = CandidateFilter {
                    ssid: profile.ssid.clone(),
                    security: profile.security,
                    channel_policy: profile.channel_policy,
                };
                self.platform.candidates.query(&filter)
            }
        };
        if candidates.is_empty() {
            debug!("no candidates for {}: iface={}", profile.ssid, interface_id);
            self.complete_active(interface_id, CommandStatus::NoCandidates);
            return;
        }
        candidates.sort_by(|a, b| b.score.cmp(&a.score));

        if let Some(active) = self.queue.active_mut(interface_id) {
            active.cursor = Some(ConnectCursor::new(profile, candidates, was_connected));
        }
        self.advance_join(interface_id);
    }

    /// Dispatch entry for a Reassociate command. Same-AP reassociation
    /// short-circuits the candidate walk entirely; a new-profile variant is
    /// an ordinary walk.
    pub(crate) fn start_reassociate(&mut self, interface_id: InterfaceId) {
        let Some(active) = self.queue.active(interface_id) else {
            return;
        };
        if !matches!(&active.command, RoamCommand::Reassociate { profile: None }) {
            self.start_connect(interface_id);
            return;
        }

        let association = match self.sessions.get(interface_id) {
            Ok(session) => match (&session.cached_bss, &session.connected_profile) {
                (Some(bss), Some(connected)) => Some((bss.clone(), connected.clone())),
                _ => None,
            },
            Err(_) => None,
        };
        let Some((bss, connected)) = association else {
            self.complete_active(
                interface_id,
                CommandStatus::Failed {
                    reason: "not associated".to_string(),
                },
            );
            return;
        };

        let profile = Profile {
            ssid: connected.ssid,
            security: connected.security,
            channel_policy: ChannelPolicy::Fixed(connected.channel),
        };
        let mut cursor = ConnectCursor::new(profile, Vec::new(), true);
        cursor.step = JoinStep::AwaitReassoc;
        cursor.target = Some(bss.clone());

        if let Ok(session) = self.sessions.get_mut(interface_id) {
            session.enter_joining(Substate::JoinRequest);
        }
        if let Some(active) = self.queue.active_mut(interface_id) {
            active.cursor = Some(cursor);
        }
        self.platform
            .transport
            .send(interface_id, LinkRequest::Reassoc { bss });
    }

    /// Walk candidates from the cursor position until a request goes on
    /// the air or the list is exhausted.
    pub(crate) fn advance_join(&mut self, interface_id: InterfaceId) {
        let action = {
            let EngineInner {
                queue,
                sessions,
                platform,
                config,
                ..
            } = self;
            let Some(active) = queue.active_mut(interface_id) else {
                return;
            };
            let Some(cursor) = active.cursor.as_mut() else {
                return;
            };
            let Ok(session) = sessions.get_mut(interface_id) else {
                return;
            };

            loop {
                let Some(candidate) = cursor.candidates.get(cursor.index) else {
                    // Exhausted. If no teardown happened along the way the
                    // prior association is still intact.
                    let status = if !cursor.candidates.is_empty()
                        && cursor.malformed == cursor.candidates.len()
                    {
                        CommandStatus::MalformedCandidate
                    } else if cursor.was_connected && cursor.saw_concurrency_reject {
                        CommandStatus::ConcurrencyBlocked
                    } else {
                        CommandStatus::NothingToJoin
                    };
                    let settled = if session.connected_profile.is_some() {
                        LinkState::Joined
                    } else {
                        LinkState::Idle
                    };
                    session.set_state(settled);
                    break Action::Complete(status);
                };

                let parsed = match platform.codec.parse(&candidate.body) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        debug!(
                            "candidate {} skipped, malformed body: iface={} err={}",
                            candidate.bssid, interface_id, err
                        );
                        cursor.malformed += 1;
                        cursor.index += 1;
                        continue;
                    }
                };
                if parsed.ssid != cursor.profile.ssid
                    || parsed.security != cursor.profile.security
                    || !cursor.profile.channel_policy.allows(candidate.channel)
                {
                    debug!(
                        "candidate {} skipped, profile mismatch: iface={}",
                        candidate.bssid, interface_id
                    );
                    cursor.index += 1;
                    continue;
                }

                let bss = BssDescription {
                    bssid: candidate.bssid,
                    ssid: parsed.ssid,
                    channel: candidate.channel,
                    security: parsed.security,
                    signal_dbm: candidate.signal_dbm,
                };
                match platform.policy.admit(&bss, interface_id) {
                    Admission::Admit => {}
                    Admission::Reject(reason) => {
                        debug!(
                            "candidate {} rejected ({:?}): iface={}",
                            bss.bssid, reason, interface_id
                        );
                        if reason == RejectReason::Concurrency {
                            cursor.saw_concurrency_reject = true;
                        }
                        cursor.index += 1;
                        continue;
                    }
                }

                // Admitted: fresh per-candidate retry budgets.
                cursor.credential_retries_left = config.credential_retry_limit;
                cursor.assoc_retries_left = config.assoc_retry_limit;
                cursor.target = Some(bss.clone());

                if let Some(connected) = session.connected_profile.clone() {
                    if connected.bssid == bss.bssid && connected.security == bss.security {
                        // Same AP, unchanged security: reassociate in place,
                        // no teardown.
                        session.enter_joining(Substate::JoinRequest);
                        cursor.step = JoinStep::AwaitReassoc;
                        platform
                            .transport
                            .send(interface_id, LinkRequest::Reassoc { bss });
                        break Action::Wait;
                    }
                    // Different AP: disassociate the old one first.
                    session.enter_joining(Substate::DisassocHandoff);
                    cursor.step = JoinStep::Handoff;
                    platform.transport.send(
                        interface_id,
                        LinkRequest::Disassoc {
                            peer: connected.bssid,
                            reason: ReasonCode::UNSPECIFIED,
                        },
                    );
                    break Action::Wait;
                }

                session.enter_joining(Substate::JoinRequest);
                cursor.step = JoinStep::AwaitJoin;
                let cached_key = platform.keys.lookup(bss.bssid).is_some();
                platform.transport.send(
                    interface_id,
                    LinkRequest::Join {
                        bss,
                        profile: cursor.profile.clone(),
                        cached_key,
                    },
                );
                break Action::Wait;
            }
        };

        match action {
            Action::Wait => {}
            Action::Complete(status) => self.complete_active(interface_id, status),
            Action::Advance => self.advance_join(interface_id),
        }
    }

    /// True when the interface's active command is a candidate walk
    /// waiting on its handoff disassociation.
    pub(crate) fn handoff_in_progress(&self, interface_id: InterfaceId) -> bool {
        self.queue
            .active(interface_id)
            .and_then(|active| active.cursor.as_ref())
            .map(|cursor| cursor.step == JoinStep::Handoff)
            .unwrap_or(false)
    }

    /// The old BSS is gone; issue the join the handoff was clearing the
    /// way for.
    pub(crate) fn handle_handoff_confirm(&mut self, interface_id: InterfaceId, peer: MacAddress) {
        let EngineInner {
            queue,
            sessions,
            platform,
            ..
        } = self;
        let Some(active) = queue.active_mut(interface_id) else {
            return;
        };
        let Some(cursor) = active.cursor.as_mut() else {
            return;
        };
        if cursor.step != JoinStep::Handoff {
            return;
        }
        let Ok(session) = sessions.get_mut(interface_id) else {
            return;
        };
        let Some(bss) = cursor.target.clone() else {
            return;
        };

        debug!(
            "handoff disassoc of {} done, joining {}: iface={}",
            peer, bss.bssid, interface_id
        );
        session.stats.record(DisconnectCause::LocalRequest);
        session.connected_profile = None;
        session.cached_bss = None;
        session.set_substate(Substate::JoinRequest);
        cursor.step = JoinStep::AwaitJoin;

        let cached_key = platform.keys.lookup(bss.bssid).is_some();
        platform.transport.send(
            interface_id,
            LinkRequest::Join {
                bss,
                profile: cursor.profile.clone(),
                cached_key,
            },
        );
    }

    /// Outcome of an outstanding join/reassociate request.
    pub(crate) fn handle_join_confirm(&mut self, interface_id: InterfaceId, status: JoinStatus) {
        let action = {
            let EngineInner {
                queue,
                sessions,
                platform,
                ..
            } = self;
            let Some(active) = queue.active_mut(interface_id) else {
                warn!("join confirm with no active command: iface={}", interface_id);
                return;
            };
            let Some(cursor) = active.cursor.as_mut() else {
                warn!("join confirm without a candidate walk: iface={}", interface_id);
                return;
            };
            if !matches!(cursor.step, JoinStep::AwaitJoin | JoinStep::AwaitReassoc) {
                warn!(
                    "unexpected join confirm in step {:?}: iface={}",
                    cursor.step, interface_id
                );
                return;
            }
            let Ok(session) = sessions.get_mut(interface_id) else {
                return;
            };
            let Some(target) = cursor.target.clone() else {
                return;
            };

            match status {
                JoinStatus::Success => {
                    session.set_substate(Substate::Config);
                    session.twt_pending = true;
                    session.cached_bss = Some(target.clone());
                    session.connected_profile = Some(ConnectedProfile {
                        ssid: target.ssid.clone(),
                        bssid: target.bssid,
                        security: target.security,
                        channel: target.channel,
                    });
                    if target.security.requires_handshake() {
                        // Stay Joining until the external handshake lands.
                        session.set_substate(Substate::WaitForKey);
                    } else {
                        session.set_state(LinkState::Joined);
                    }
                    Action::Complete(CommandStatus::Associated {
                        bssid: target.bssid,
                    })
                }
                JoinStatus::InvalidCredential => {
                    // The cached credential for this peer is bad; drop it
                    // before anything else.
                    platform.keys.invalidate(target.bssid);
                    if cursor.credential_retries_left > 0 {
                        cursor.credential_retries_left -= 1;
                        debug!(
                            "credential rejected by {}, retrying candidate: iface={}",
                            target.bssid, interface_id
                        );
                        resend(platform, interface_id, cursor, target);
                        Action::Wait
                    } else {
                        cursor.next_candidate();
                        Action::Advance
                    }
                }
                JoinStatus::AssocTimeout => {
                    if cursor.profile.security.strong_auth() && cursor.assoc_retries_left > 0 {
                        cursor.assoc_retries_left -= 1;
                        debug!(
                            "association timeout at {}, retrying candidate: iface={}",
                            target.bssid, interface_id
                        );
                        resend(platform, interface_id, cursor, target);
                        Action::Wait
                    } else {
                        cursor.next_candidate();
                        Action::Advance
                    }
                }
                JoinStatus::Refused { code } => {
                    debug!(
                        "join refused by {} (status {}): iface={}",
                        target.bssid, code, interface_id
                    );
                    cursor.next_candidate();
                    Action::Advance
                }
            }
        };

        match action {
            Action::Wait => {}
            Action::Complete(status) => self.complete_active(interface_id, status),
            Action::Advance => self.advance_join(interface_id),
        }
    }
}

/// Re-issue the outstanding join/reassociate for a same-candidate retry.
fn resend(
    platform: &crate::platform::Platform,
    interface_id: InterfaceId,
    cursor: &ConnectCursor,
    target: BssDescription,
) {
    match cursor.step {
        JoinStep::AwaitReassoc => platform
            .transport
            .send(interface_id, LinkRequest::Reassoc { bss: target }),
        _ => {
            let cached_key = platform.keys.lookup(target.bssid).is_some();
            platform.transport.send(
                interface_id,
                LinkRequest::Join {
                    bss: target,
                    profile: cursor.profile.clone(),
                    cached_key,
                },
            );
        }
    }
}
