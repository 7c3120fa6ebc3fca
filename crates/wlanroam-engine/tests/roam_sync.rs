//! Firmware roam-synch sequences replayed through the facade.

mod common;

use common::*;

use wlanroam_engine::platform::{LinkEvent, LinkRequest};
use wlanroam_engine::{LinkState, RoamAuthStatus, RoamSyncEvent, Substate};
use wlanroam_types::{
    BssDescription, CommandStatus, DisconnectCause, InterfaceId, MacAddress, Profile, ReasonCode,
    SecurityProtocol,
};

const IF0: InterfaceId = InterfaceId(0);

fn joined_fixture(bssid: MacAddress) -> Fixture {
    let fx = Fixture::new();
    fx.add_interface(IF0);
    fx.candidates.set(vec![candidate(
        bssid,
        "alpha",
        SecurityProtocol::Open,
        chan(6),
        50,
    )]);
    fx.engine.connect(IF0, Profile::open("alpha")).unwrap();
    fx.engine.on_link_event(
        IF0,
        LinkEvent::JoinConfirm {
            status: wlanroam_engine::platform::JoinStatus::Success,
        },
    );
    fx.transport.take();
    fx.drain_completions();
    fx
}

fn roamed_bss(bssid: MacAddress, security: SecurityProtocol) -> BssDescription {
    BssDescription {
        bssid,
        ssid: "alpha".into(),
        channel: chan(36),
        security,
        signal_dbm: -48,
    }
}

#[test]
fn test_roam_sync_commits_new_bss() {
    let old = mac(30);
    let new = mac(31);
    let fx = joined_fixture(old);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);
    assert!(fx.engine.scans_suppressed(IF0).unwrap());
    assert_eq!(fx.scheduler.armed_count(), 1);

    fx.engine
        .on_roam_sync_event(IF0, RoamSyncEvent::DeregisterOldPeer);
    fx.engine.on_roam_sync_event(
        IF0,
        RoamSyncEvent::SyncPropagation {
            bss: roamed_bss(new, SecurityProtocol::Open),
            auth: RoamAuthStatus::Authenticated,
        },
    );
    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::SyncComplete);

    assert_eq!(fx.engine.connected_bssid(IF0).unwrap(), Some(new));
    assert_eq!(
        fx.engine.link_state(IF0).unwrap(),
        (LinkState::Joined, Substate::None)
    );
    assert!(!fx.engine.scans_suppressed(IF0).unwrap());
    assert_eq!(fx.scheduler.armed_count(), 0);
    assert!(fx.keys.contains(new));
    assert_eq!(fx.policy.topology_changes(), vec![(IF0, new)]);
}

#[test]
fn test_roam_holds_queue_until_complete() {
    let old = mac(40);
    let new = mac(41);
    let fx = joined_fixture(old);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);

    // Commands submitted mid-roam are held.
    let held = fx.engine.disconnect(IF0, ReasonCode::UNSPECIFIED).unwrap();
    assert_eq!(fx.transport.sent_count(), 0);

    fx.engine
        .on_roam_sync_event(IF0, RoamSyncEvent::DeregisterOldPeer);
    fx.engine.on_roam_sync_event(
        IF0,
        RoamSyncEvent::SyncPropagation {
            bss: roamed_bss(new, SecurityProtocol::Open),
            auth: RoamAuthStatus::Authenticated,
        },
    );
    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::SyncComplete);

    // The held teardown resumes against the roamed link.
    assert_eq!(fx.engine.connected_bssid(IF0).unwrap(), Some(new));
    assert_eq!(
        fx.engine.link_state(IF0).unwrap(),
        (LinkState::Joining, Substate::DisassocRequest)
    );
    assert_eq!(fx.scheduler.armed_count(), 1);
    assert!(matches!(
        fx.transport.last(),
        Some((_, LinkRequest::Disassoc { peer, .. })) if peer == new
    ));
    fx.engine
        .on_link_event(IF0, LinkEvent::DisassocConfirm { peer: new });
    assert_eq!(
        fx.status_of(held),
        Some(CommandStatus::Disconnected {
            cause: DisconnectCause::LocalRequest
        })
    );
    assert_eq!(
        fx.engine.link_state(IF0).unwrap(),
        (LinkState::Idle, Substate::None)
    );
}

#[test]
fn test_roam_sync_pending_key_waits_for_handshake() {
    let old = mac(32);
    let new = mac(33);
    let fx = joined_fixture(old);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);
    fx.engine
        .on_roam_sync_event(IF0, RoamSyncEvent::DeregisterOldPeer);
    fx.engine.on_roam_sync_event(
        IF0,
        RoamSyncEvent::SyncPropagation {
            bss: roamed_bss(new, SecurityProtocol::Wpa3Personal),
            auth: RoamAuthStatus::ConnectedPendingKey,
        },
    );
    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::SyncComplete);

    assert_eq!(
        fx.engine.link_state(IF0).unwrap(),
        (LinkState::Joining, Substate::WaitForKey)
    );
    assert_eq!(fx.engine.connected_bssid(IF0).unwrap(), Some(new));

    fx.engine.on_link_event(IF0, LinkEvent::KeyInstalled);
    assert_eq!(
        fx.engine.link_state(IF0).unwrap(),
        (LinkState::Joined, Substate::None)
    );
}

#[test]
fn test_roam_sync_watchdog_abandons_stalled_sequence() {
    let old = mac(34);
    let fx = joined_fixture(old);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);
    assert!(fx.engine.scans_suppressed(IF0).unwrap());

    // The terminal event never arrives.
    fx.fire_timeout();

    assert!(!fx.engine.scans_suppressed(IF0).unwrap());
    assert_eq!(fx.engine.connected_bssid(IF0).unwrap(), Some(old));
    assert_eq!(
        fx.engine.link_state(IF0).unwrap(),
        (LinkState::Joined, Substate::None)
    );

    // The queue is live again.
    fx.engine.disconnect(IF0, ReasonCode::UNSPECIFIED).unwrap();
    assert!(matches!(
        fx.transport.last(),
        Some((_, LinkRequest::Disassoc { peer, .. })) if peer == old
    ));
}

#[test]
fn test_roam_sync_abort_keeps_old_link() {
    let old = mac(35);
    let fx = joined_fixture(old);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);
    // A second Start mid-roam is ignored.
    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);
    assert_eq!(fx.scheduler.armed_count(), 1);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Abort);
    assert_eq!(fx.scheduler.armed_count(), 0);
    assert!(!fx.engine.scans_suppressed(IF0).unwrap());
    assert_eq!(fx.engine.connected_bssid(IF0).unwrap(), Some(old));
}

#[test]
fn test_roam_sync_complete_without_propagation_aborts() {
    let old = mac(36);
    let fx = joined_fixture(old);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);
    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::SyncComplete);

    assert_eq!(fx.engine.connected_bssid(IF0).unwrap(), Some(old));
    assert!(!fx.engine.scans_suppressed(IF0).unwrap());
    assert!(fx.policy.topology_changes().is_empty());
}

#[test]
fn test_roam_invoke_fail_tears_down_user_initiated() {
    let old = mac(37);
    let fx = joined_fixture(old);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);
    fx.engine.on_roam_sync_event(
        IF0,
        RoamSyncEvent::InvokeFail {
            user_initiated: true,
        },
    );

    // The failed user roam leaves a suspect link; the engine tears it
    // down itself.
    assert!(matches!(
        fx.transport.last(),
        Some((_, LinkRequest::Disassoc { peer, .. })) if peer == old
    ));
    fx.engine
        .on_link_event(IF0, LinkEvent::DisassocConfirm { peer: old });
    assert_eq!(fx.engine.connected_bssid(IF0).unwrap(), None);
    let done = fx.completions();
    assert_eq!(done.len(), 1);
    assert_eq!(
        done[0].1,
        CommandStatus::Disconnected {
            cause: DisconnectCause::LocalRequest
        }
    );
}

#[test]
fn test_roam_invoke_fail_firmware_initiated_keeps_link() {
    let old = mac(38);
    let fx = joined_fixture(old);

    fx.engine.on_roam_sync_event(IF0, RoamSyncEvent::Start);
    fx.engine.on_roam_sync_event(
        IF0,
        RoamSyncEvent::InvokeFail {
            user_initiated: false,
        },
    );

    assert_eq!(fx.transport.sent_count(), 0);
    assert_eq!(fx.engine.connected_bssid(IF0).unwrap(), Some(old));
    assert!(!fx.engine.scans_suppressed(IF0).unwrap());
}
