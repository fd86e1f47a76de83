#![cfg(all(test, not(target_arch = "wasm32")))]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use comms_abi::{
    EventLoopPort, HostEndpoint, InboundError, InboundOutcome, NanoappInfo, Permissions,
    SystemCallbackType,
};
use host_comms::SendError;
use host_link::HostLinkConfig;

use crate::harness::{free_probe, wait_until, FreedLog, Harness, Inbox, WAIT};

/// Accepted messages get their free callback exactly once, whether the host received them or not.
#[test]
fn free_callback_fires_once_for_delivered_and_failed_messages() {
    let harness = Harness::single();
    let (app, _) = harness.load_inbox(0, 0x100);
    let freed = FreedLog::default();

    harness.link.fail_next(1);
    for payload in [vec![1u8], vec![2u8]] {
        assert!(harness.manager.send_message_to_host_from_nanoapp(
            &app,
            payload,
            0,
            HostEndpoint(1),
            Permissions::NONE,
            Some(free_probe(&freed)),
        ));
    }

    assert!(wait_until(WAIT, || freed.lock().len() == 2));
    thread::sleep(Duration::from_millis(20));
    let freed = freed.lock().clone();
    assert_eq!(freed.len(), 2, "no extra free callbacks");
    let mut payloads = freed.iter().map(|f| f.payload.clone()).collect::<Vec<_>>();
    payloads.sort();
    assert_eq!(payloads, vec![vec![1], vec![2]]);

    let link = harness.link.metrics();
    assert_eq!(link.failed, 1);
    assert_eq!(link.transmitted, 1);
    assert!(wait_until(WAIT, || harness.manager.outstanding_messages() == 0));
}

/// Refused messages never see their free callback.
#[test]
fn rejected_message_never_frees() {
    let harness = Harness::single();
    let app = harness.load(0, 0x101, Permissions(0x1), Inbox::new().0);
    let freed = FreedLog::default();

    let rejected = harness
        .manager
        .try_send_message_to_host_from_nanoapp(
            &app,
            vec![7],
            0,
            HostEndpoint(1),
            Permissions(0x2),
            Some(free_probe(&freed)),
        )
        .expect_err("message permissions exceed app permissions");
    assert!(matches!(
        rejected.error,
        SendError::PermissionViolation { .. }
    ));

    assert!(harness.manager.flush_outbound_queue());
    thread::sleep(Duration::from_millis(20));
    assert!(freed.lock().is_empty());
    assert!(harness.link.take_received().is_empty());
}

/// The pool holds 32 in-flight messages; the 33rd send fails until completions arrive.
#[test]
fn thirty_third_message_exhausts_pool() {
    let harness = Harness::single();
    let (app, _) = harness.load_inbox(0, 0x102);
    let freed = FreedLog::default();
    harness.link.pause();

    for i in 0..32u8 {
        assert!(
            harness.manager.send_message_to_host_from_nanoapp(
                &app,
                vec![i],
                0,
                HostEndpoint(1),
                Permissions::NONE,
                Some(free_probe(&freed)),
            ),
            "message {i} should be accepted"
        );
    }
    assert!(!harness.manager.send_message_to_host_from_nanoapp(
        &app,
        vec![32],
        0,
        HostEndpoint(1),
        Permissions::NONE,
        Some(free_probe(&freed)),
    ));
    assert_eq!(harness.manager.metrics().rejected_pool_exhausted, 1);

    harness.link.resume();
    assert!(harness.manager.flush_outbound_queue());
    assert!(wait_until(WAIT, || freed.lock().len() == 32));
    assert!(wait_until(WAIT, || harness.manager.outstanding_messages() == 0));
    assert!(harness.manager.send_message_to_host_from_nanoapp(
        &app,
        vec![33],
        0,
        HostEndpoint(1),
        Permissions::NONE,
        None,
    ));
}

/// Inbound messages are copied: the host may reuse its buffer right away.
#[test]
fn inbound_message_is_copied_and_delivered_once() {
    let harness = Harness::single();
    let (app, received) = harness.load_inbox(0, 0x200);
    let mut buffer = vec![0xAB; 64];

    let outcome = harness
        .link
        .deliver_from_host(0x200, 9, HostEndpoint(0x30), &buffer)
        .expect("core bound");
    assert_eq!(outcome, InboundOutcome::Delivered);
    buffer.fill(0);

    assert!(wait_until(WAIT, || !received.lock().is_empty()));
    thread::sleep(Duration::from_millis(20));
    let received = received.lock().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].instance_id, app.instance_id());
    assert_eq!(received[0].message_type, 9);
    assert_eq!(received[0].host_endpoint, HostEndpoint(0x30));
    assert_eq!(received[0].payload, vec![0xAB; 64]);
    assert_eq!(received[0].thread.as_deref(), Some("system"));
    assert!(wait_until(WAIT, || harness.manager.outstanding_messages() == 0));
}

#[test]
fn broadcast_source_is_refused() {
    let harness = Harness::single();
    harness.load_inbox(0, 0x201);
    let outcome = harness
        .link
        .deliver_from_host(0x201, 0, HostEndpoint::BROADCAST, &[1])
        .expect("core bound");
    assert_eq!(
        outcome,
        InboundOutcome::Rejected(InboundError::BroadcastSource)
    );
}

/// A message for a nanoapp that never loads is dropped after the deferred retry.
#[test]
fn unknown_destination_dropped_after_retry() {
    let harness = Harness::single();
    let (_, received) = harness.load_inbox(0, 0x300);

    let outcome = harness
        .link
        .deliver_from_host(0xBAD, 1, HostEndpoint(1), &[1, 2, 3])
        .expect("core bound");
    assert_eq!(outcome, InboundOutcome::Deferred);

    assert!(wait_until(WAIT, || {
        harness.manager.metrics().unknown_destination_drops == 1
    }));
    assert!(received.lock().is_empty());
    assert_eq!(harness.manager.outstanding_messages(), 0);
}

/// A message racing a pending load is retried on the system loop once the load has run.
#[test]
fn deferred_message_reaches_nanoapp_loaded_meanwhile() {
    let harness = Harness::single();
    let system = harness.event_loop(0);
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    assert!(system.defer_callback(
        SystemCallbackType::DeferredMessageToNanoappFromHost,
        Box::new(move || {
            let _ = gate_rx.recv();
        }),
    ));

    let (inbox, received) = Inbox::new();
    system
        .request_load(0x310, Permissions::NONE, Box::new(inbox))
        .expect("queue load");
    let outcome = harness
        .link
        .deliver_from_host(0x310, 4, HostEndpoint(2), &[9, 9])
        .expect("core bound");
    assert_eq!(outcome, InboundOutcome::Deferred);

    gate_tx.send(()).expect("loop waiting on gate");
    assert!(wait_until(WAIT, || received.lock().len() == 1));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(received.lock().len(), 1);
    assert_eq!(received.lock()[0].payload, vec![9, 9]);

    let metrics = harness.manager.metrics();
    assert_eq!(metrics.inbound_deferred, 1);
    assert_eq!(metrics.deferred_delivered, 1);
    assert_eq!(metrics.unknown_destination_drops, 0);
    assert!(wait_until(WAIT, || harness.manager.outstanding_messages() == 0));
}

/// Only the first message waking the host is blamed, until the host suspends again.
#[test]
fn first_waking_nanoapp_is_blamed_until_suspend() {
    let harness = Harness::single();
    let (first, _) = harness.load_inbox(0, 0x400);
    let (second, _) = harness.load_inbox(0, 0x401);
    let send = |app: &Arc<NanoappInfo>| {
        assert!(harness.manager.send_message_to_host_from_nanoapp(
            app,
            vec![0],
            0,
            HostEndpoint(1),
            Permissions::NONE,
            None,
        ));
    };

    harness.power.on_host_suspend();
    send(&first);
    send(&second);
    assert!(harness.manager.is_nanoapp_blamed_for_wakeup());
    assert_eq!(first.wakeup_blame_count(), 1);
    assert_eq!(second.wakeup_blame_count(), 0);

    harness.power.on_host_wakeup();
    send(&second);
    assert_eq!(second.wakeup_blame_count(), 0, "awake host blames nobody");

    harness.power.on_host_suspend();
    assert!(!harness.manager.is_nanoapp_blamed_for_wakeup());
    send(&second);
    assert_eq!(second.wakeup_blame_count(), 1);
    assert_eq!(first.wakeup_blame_count(), 1);

    assert!(harness.manager.flush_outbound_queue());
    let woke: Vec<bool> = harness
        .link
        .take_received()
        .iter()
        .map(|delivery| delivery.woke_host)
        .collect();
    assert_eq!(woke, vec![true, true, false, true]);
}

/// A link reporting every completion twice costs one free callback and no pool slot.
#[test]
fn duplicate_completions_are_ignored() {
    let harness = Harness::start(
        HostLinkConfig {
            duplicate_completions: true,
            ..HostLinkConfig::default()
        },
        &["system"],
    );
    let (app, _) = harness.load_inbox(0, 0x500);
    let freed = FreedLog::default();

    assert!(harness.manager.send_message_to_host_from_nanoapp(
        &app,
        vec![5],
        0,
        HostEndpoint(1),
        Permissions::NONE,
        Some(free_probe(&freed)),
    ));
    assert!(harness.manager.flush_outbound_queue());
    assert!(wait_until(WAIT, || freed.lock().len() == 1));
    assert!(wait_until(WAIT, || harness.manager.outstanding_messages() == 0));

    let metrics = harness.manager.metrics();
    assert_eq!(metrics.completions, 1);
    assert_eq!(metrics.duplicate_completions, 1);
    assert_eq!(freed.lock().len(), 1);
}

/// Free callbacks run on the loop hosting the sender, never on the transport thread.
#[test]
fn free_callback_runs_on_owning_loop_thread() {
    let harness = Harness::start(HostLinkConfig::default(), &["system", "sensors"]);
    let (on_system, _) = harness.load_inbox(0, 0x600);
    let (on_sensors, _) = harness.load_inbox(1, 0x601);
    let freed = FreedLog::default();

    for app in [&on_system, &on_sensors] {
        assert!(harness.manager.send_message_to_host_from_nanoapp(
            app,
            app.app_id().to_le_bytes().to_vec(),
            0,
            HostEndpoint(1),
            Permissions::NONE,
            Some(free_probe(&freed)),
        ));
    }
    assert!(wait_until(WAIT, || freed.lock().len() == 2));

    for freed in freed.lock().iter() {
        let expected = if freed.payload == 0x600u64.to_le_bytes() {
            "system"
        } else {
            "sensors"
        };
        assert_eq!(freed.thread.as_deref(), Some(expected));
    }
}

/// Concurrent senders share the pool. Order across nanoapps is not guaranteed,
/// so only per-sender completeness is checked.
#[test]
fn concurrent_senders_share_pool() {
    const SENDERS: u64 = 4;
    const MESSAGES: u32 = 200;
    let harness = Harness::single();
    let freed = FreedLog::default();
    let apps = (0..SENDERS)
        .map(|i| harness.load_inbox(0, 0x700 + i).0)
        .collect::<Vec<_>>();

    thread::scope(|scope| {
        for app in &apps {
            let manager = &harness.manager;
            let freed = &freed;
            scope.spawn(move || {
                for seq in 0..MESSAGES {
                    let mut payload = app.app_id().to_le_bytes().to_vec();
                    payload.extend_from_slice(&seq.to_le_bytes());
                    loop {
                        match manager.try_send_message_to_host_from_nanoapp(
                            app,
                            payload,
                            0,
                            HostEndpoint(1),
                            Permissions::NONE,
                            Some(free_probe(freed)),
                        ) {
                            Ok(_) => break,
                            Err(rejected) => {
                                assert_eq!(rejected.error, SendError::PoolExhausted);
                                payload = rejected.message;
                                thread::yield_now();
                            }
                        }
                    }
                }
            });
        }
    });

    let total = (SENDERS as usize) * MESSAGES as usize;
    assert!(wait_until(WAIT, || freed.lock().len() == total));
    assert!(wait_until(WAIT, || harness.manager.outstanding_messages() == 0));

    let freed = freed.lock().clone();
    for app in &apps {
        let mut seqs = freed
            .iter()
            .filter(|f| f.payload[..8] == app.app_id().to_le_bytes())
            .map(|f| u32::from_le_bytes([f.payload[8], f.payload[9], f.payload[10], f.payload[11]]))
            .collect::<Vec<_>>();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..MESSAGES).collect::<Vec<_>>());
        assert_eq!(app.messages_sent_count(), MESSAGES);
    }
}

/// Flushing gives up once the host stalls past the configured timeout.
#[test]
fn flush_times_out_while_host_stalls() {
    let harness = Harness::start(
        HostLinkConfig {
            flush_timeout_ms: 20,
            ..HostLinkConfig::default()
        },
        &["system"],
    );
    let (app, _) = harness.load_inbox(0, 0x800);
    harness.link.pause();
    assert!(harness.manager.send_message_to_host_from_nanoapp(
        &app,
        vec![1],
        0,
        HostEndpoint(1),
        Permissions::NONE,
        None,
    ));
    assert!(!harness.manager.flush_outbound_queue());

    harness.link.resume();
    assert!(wait_until(WAIT, || harness.manager.flush_outbound_queue()));
    assert_eq!(harness.link.take_received().len(), 1);
}

/// After shutdown the host is told the hub is exiting and new messages are refused.
#[test]
fn shutdown_notifies_host_and_refuses_messages() {
    let harness = Harness::single();
    let (app, _) = harness.load_inbox(0, 0x900);
    let freed = FreedLog::default();
    assert!(harness.manager.send_message_to_host_from_nanoapp(
        &app,
        vec![1],
        0,
        HostEndpoint(1),
        Permissions::NONE,
        Some(free_probe(&freed)),
    ));

    harness.manager.shutdown();
    assert!(harness.link.exiting_notice_sent());
    assert!(wait_until(WAIT, || freed.lock().len() == 1));

    let rejected = harness
        .manager
        .try_send_message_to_host_from_nanoapp(
            &app,
            vec![2],
            0,
            HostEndpoint(1),
            Permissions::NONE,
            None,
        )
        .expect_err("link is shut down");
    assert_eq!(rejected.error, SendError::TransportRejected);
    assert_eq!(rejected.message, vec![2]);
}
