//! End-to-end tests for the host communications stack.


#[cfg(all(test, not(target_arch = "wasm32")))]
mod native_e2e;

#[cfg(test)]
mod tests {
    use comms_abi::{
        Event, EventData, EventLoopPort, HostEndpoint, Permissions, SYSTEM_INSTANCE_ID,
    };
    use event_loop::{EventLoop, EventLoopConfig};
    use host_comms::{HostCommsConfig, HostCommsManager};
    use host_link::{HostLinkConfig, PowerControlManager, SimulatedHostLink};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Wires the stack without threads: the test drives the loop and the link by hand.
    #[test]
    fn manual_round_trip_to_host() {
        let link = Arc::new(SimulatedHostLink::new(HostLinkConfig::default()));
        let power = Arc::new(PowerControlManager::default());
        let mut event_loop = EventLoop::new(EventLoopConfig::default());
        let handle = event_loop.handle();
        let manager = HostCommsManager::builder()
            .config(HostCommsConfig::default())
            .host_link(link.clone())
            .power_control(power)
            .event_loop(Arc::new(handle.clone()))
            .build()
            .expect("build host comms");

        struct Quiet;
        impl event_loop::Nanoapp for Quiet {
            fn handle_event(&mut self, _: &event_loop::NanoappContext, _: &comms_abi::Event) {}
        }
        handle
            .request_load(0x42, Permissions(0x3), Box::new(Quiet))
            .expect("queue load");
        event_loop.run_until_idle();
        let app = handle.nanoapp_info(0x42).expect("loaded");

        let freed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&freed);
        assert!(manager.send_message_to_host_from_nanoapp(
            &app,
            vec![1, 2, 3],
            11,
            HostEndpoint(5),
            Permissions(0x1),
            Some(Box::new(move |payload| sink.lock().push(payload))),
        ));
        assert_eq!(manager.outstanding_messages(), 1);

        assert_eq!(link.pump(usize::MAX), 1);
        assert!(freed.lock().is_empty(), "callback waits for the loop");
        event_loop.run_until_idle();
        assert_eq!(*freed.lock(), vec![vec![1, 2, 3]]);
        assert_eq!(manager.outstanding_messages(), 0);

        let received = link.take_received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].app_id, 0x42);
        assert_eq!(received[0].message_type, 11);
        assert_eq!(received[0].host_endpoint, HostEndpoint(5));
        assert_eq!(received[0].payload, vec![1, 2, 3]);
    }

    /// A free callback is never lost because the owning loop's event queue is full.
    #[test]
    fn free_callback_survives_full_event_queue() {
        let link = Arc::new(SimulatedHostLink::new(HostLinkConfig::default()));
        let mut event_loop = EventLoop::new(EventLoopConfig {
            event_queue_capacity: 4,
            ..EventLoopConfig::default()
        });
        let handle = event_loop.handle();
        let manager = HostCommsManager::builder()
            .host_link(link.clone())
            .power_control(Arc::new(PowerControlManager::default()))
            .event_loop(Arc::new(handle.clone()))
            .build()
            .expect("build host comms");

        struct Quiet;
        impl event_loop::Nanoapp for Quiet {
            fn handle_event(&mut self, _: &event_loop::NanoappContext, _: &comms_abi::Event) {}
        }
        handle
            .request_load(0x43, Permissions::NONE, Box::new(Quiet))
            .expect("queue load");
        event_loop.run_until_idle();
        let app = handle.nanoapp_info(0x43).expect("loaded");

        let freed = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&freed);
        assert!(manager.send_message_to_host_from_nanoapp(
            &app,
            vec![4],
            0,
            HostEndpoint(1),
            Permissions::NONE,
            Some(Box::new(move |_payload: Vec<u8>| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        ));

        for value in 0..4 {
            let event = Event::new(1, SYSTEM_INSTANCE_ID, app.instance_id(), EventData::Value(value));
            assert!(handle.post_event(event).is_ok());
        }
        assert!(handle
            .post_event(Event::new(1, SYSTEM_INSTANCE_ID, app.instance_id(), EventData::Empty))
            .is_err());

        assert_eq!(link.pump(usize::MAX), 1);
        event_loop.run_until_idle();
        assert_eq!(freed.load(Ordering::SeqCst), 1);
        let metrics = manager.metrics();
        assert_eq!(metrics.free_callbacks_invoked, 1);
        assert_eq!(metrics.free_callbacks_abandoned, 0);
        assert_eq!(manager.outstanding_messages(), 0);
    }

    #[test]
    fn default_configs_line_up() {
        assert_eq!(HostCommsConfig::default().max_outstanding_messages, 32);
        assert!(HostLinkConfig::default().outbound_queue_capacity >= 32);
    }
}
