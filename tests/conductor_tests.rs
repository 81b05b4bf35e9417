//! Conductor state machine tests driven with a virtual clock

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use baton::{
        cnc::CncFile,
        command::{encode, DriverEvent, ErrorCode},
        concurrent::{BroadcastReceiver, CommandRing, CopyBroadcastReceiver},
        context::DriverContext,
        driver::DriverConductor,
    };

    const STREAM_ID_1: i32 = 10;
    const STREAM_ID_2: i32 = 20;

    const LIVENESS_TIMEOUT_NS: i64 = 5_000_000_000;
    const LINGER_TIMEOUT_NS: i64 = 1_000_000_000;

    struct TestDriver {
        _dir: TempDir,
        conductor: DriverConductor,
        ring: CommandRing,
        receiver: CopyBroadcastReceiver,
        _cnc: Arc<CncFile>,
        now_ns: i64,
        id_counter: i64,
    }

    impl TestDriver {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let context = DriverContext {
                aeron_dir: dir.path().join("driver"),
                to_driver_buffer_length: 64 * 1024,
                to_clients_buffer_length: 64 * 1024,
                error_log_buffer_length: 8192,
                publication_log_buffer_length: 4096,
                client_liveness_timeout_ns: LIVENESS_TIMEOUT_NS,
                publication_linger_timeout_ns: LINGER_TIMEOUT_NS,
                command_drain_limit: 32,
                ..Default::default()
            };

            let cnc = Arc::new(
                CncFile::create(
                    &context.aeron_dir,
                    context.cnc_lengths(),
                    context.client_liveness_timeout_ns,
                    0,
                )
                .unwrap(),
            );
            let conductor = DriverConductor::new(context, Arc::clone(&cnc), 0).unwrap();
            let ring = CommandRing::new(cnc.to_driver_buffer()).unwrap();
            let receiver =
                CopyBroadcastReceiver::new(BroadcastReceiver::new(cnc.to_clients_buffer()).unwrap());

            Self {
                _dir: dir,
                conductor,
                ring,
                receiver,
                _cnc: cnc,
                now_ns: 1_000_000_000,
                id_counter: 0,
            }
        }

        fn next_id(&mut self) -> i64 {
            self.id_counter += 1;
            self.id_counter
        }

        fn do_work(&mut self) {
            self.conductor.duty_cycle(self.now_ns).unwrap();
        }

        fn advance_and_work(&mut self, delta_ns: i64) {
            self.now_ns += delta_ns;
            self.do_work();
        }

        fn send(&mut self, (msg_type_id, payload): (i32, Vec<u8>)) {
            self.ring.write(msg_type_id, &payload).unwrap();
        }

        fn read_events(&mut self) -> Vec<DriverEvent> {
            let mut events = Vec::new();
            self.receiver
                .receive(|type_id, payload| {
                    events.push(baton::command::decode_event(type_id, payload).unwrap())
                })
                .unwrap();
            events
        }

        fn add_ipc_subscription(&mut self, client_id: i64, correlation_id: i64, stream_id: i32) {
            self.send(encode::add_subscription(
                client_id,
                correlation_id,
                stream_id,
                "aeron:ipc",
            ));
        }

        fn add_ipc_publication(
            &mut self,
            client_id: i64,
            correlation_id: i64,
            stream_id: i32,
            is_exclusive: bool,
        ) {
            self.send(encode::add_publication(
                client_id,
                correlation_id,
                stream_id,
                "aeron:ipc",
                is_exclusive,
            ));
        }
    }

    fn expect_publication_ready(event: &DriverEvent, correlation: i64) -> (i64, i32, String) {
        match event {
            DriverEvent::OnPublicationReady {
                correlation_id,
                registration_id,
                session_id,
                log_file,
                ..
            } => {
                assert_eq!(*correlation_id, correlation);
                (*registration_id, *session_id, log_file.clone())
            }
            other => panic!("expected OnPublicationReady, got {:?}", other),
        }
    }

    #[test]
    fn test_subscription_then_publication() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();
        let sub_id = 100;
        let pub_id = 200;

        driver.add_ipc_subscription(client_id, sub_id, STREAM_ID_1);
        driver.add_ipc_publication(client_id, pub_id, STREAM_ID_1, false);
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 3);

        assert!(matches!(
            events[0],
            DriverEvent::OnSubscriptionReady { correlation_id, .. } if correlation_id == sub_id
        ));

        let (registration_id, session_id, log_file) = expect_publication_ready(&events[1], pub_id);
        assert_eq!(registration_id, pub_id);

        match &events[2] {
            DriverEvent::OnAvailableImage {
                correlation_id,
                session_id: image_session,
                stream_id,
                subscription_registration_id,
                log_file: image_log,
                source_identity,
                ..
            } => {
                assert_eq!(*correlation_id, pub_id);
                assert_eq!(*image_session, session_id);
                assert_eq!(*stream_id, STREAM_ID_1);
                assert_eq!(*subscription_registration_id, sub_id);
                assert_eq!(image_log, &log_file);
                assert_eq!(source_identity, "aeron:ipc");
            }
            other => panic!("expected OnAvailableImage, got {:?}", other),
        }

        assert_eq!(driver.conductor.publication_count(), 1);
        assert_eq!(driver.conductor.image_count(), 1);
    }

    #[test]
    fn test_publication_then_subscription() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();
        let sub_id = 100;
        let pub_id = 200;

        driver.add_ipc_publication(client_id, pub_id, STREAM_ID_1, false);
        driver.add_ipc_subscription(client_id, sub_id, STREAM_ID_1);
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 3);

        let (_, session_id, log_file) = expect_publication_ready(&events[0], pub_id);
        assert!(matches!(
            events[1],
            DriverEvent::OnSubscriptionReady { correlation_id, .. } if correlation_id == sub_id
        ));
        match &events[2] {
            DriverEvent::OnAvailableImage {
                session_id: image_session,
                subscription_registration_id,
                log_file: image_log,
                ..
            } => {
                assert_eq!(*image_session, session_id);
                assert_eq!(*subscription_registration_id, sub_id);
                assert_eq!(image_log, &log_file);
            }
            other => panic!("expected OnAvailableImage, got {:?}", other),
        }
    }

    #[test]
    fn test_second_shared_publication_reuses_first() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_subscription(client_id, 100, STREAM_ID_1);
        driver.add_ipc_publication(client_id, 200, STREAM_ID_1, false);
        driver.add_ipc_publication(client_id, 201, STREAM_ID_1, false);
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 4);

        let (registration_id, _, log_file) = expect_publication_ready(&events[1], 200);
        assert_eq!(registration_id, 200);

        // The second request maps onto the first publication: same
        // registration id, same log, and no additional image.
        let (second_registration, _, second_log) = expect_publication_ready(&events[3], 201);
        assert_eq!(second_registration, 200);
        assert_eq!(second_log, log_file);

        assert_eq!(driver.conductor.publication_count(), 1);
        assert_eq!(driver.conductor.image_count(), 1);
    }

    #[test]
    fn test_exclusive_publications_are_never_deduplicated() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_subscription(client_id, 100, STREAM_ID_1);
        driver.add_ipc_publication(client_id, 200, STREAM_ID_1, true);
        driver.add_ipc_publication(client_id, 201, STREAM_ID_1, true);
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 5);

        let (log_1, log_2) = match (&events[1], &events[3]) {
            (
                DriverEvent::OnPublicationReady {
                    correlation_id: c1,
                    is_exclusive: true,
                    log_file: l1,
                    ..
                },
                DriverEvent::OnPublicationReady {
                    correlation_id: c2,
                    is_exclusive: true,
                    log_file: l2,
                    ..
                },
            ) => {
                assert_eq!(*c1, 200);
                assert_eq!(*c2, 201);
                (l1.clone(), l2.clone())
            }
            other => panic!("expected two exclusive readiness events, got {:?}", other),
        };
        assert_ne!(log_1, log_2);

        match (&events[2], &events[4]) {
            (
                DriverEvent::OnAvailableImage {
                    correlation_id: i1,
                    subscription_registration_id: s1,
                    log_file: il1,
                    ..
                },
                DriverEvent::OnAvailableImage {
                    correlation_id: i2,
                    subscription_registration_id: s2,
                    log_file: il2,
                    ..
                },
            ) => {
                assert_eq!((*i1, *s1), (200, 100));
                assert_eq!((*i2, *s2), (201, 100));
                assert_eq!(il1, &log_1);
                assert_eq!(il2, &log_2);
            }
            other => panic!("expected two images, got {:?}", other),
        }

        assert_eq!(driver.conductor.publication_count(), 2);
        assert_eq!(driver.conductor.image_count(), 2);
    }

    #[test]
    fn test_publication_lingers_then_goes_unavailable() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_publication(client_id, 200, STREAM_ID_1, false);
        driver.add_ipc_subscription(client_id, 100, STREAM_ID_1);
        driver.do_work();
        assert_eq!(driver.read_events().len(), 3);

        let remove_id = driver.next_id();
        driver.send(encode::remove_publication(client_id, remove_id, 200));
        driver.do_work();
        assert!(driver.read_events().is_empty());
        assert_eq!(driver.conductor.publication_count(), 1);

        // Keepalive through twice the linger window.
        for _ in 0..4 {
            driver.send(encode::client_keepalive(client_id));
            driver.advance_and_work(LINGER_TIMEOUT_NS / 2);
        }

        let events = driver.read_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DriverEvent::OnUnavailableImage {
                correlation_id,
                subscription_registration_id,
                stream_id,
                channel,
            } => {
                assert_eq!(*correlation_id, 200);
                assert_eq!(*subscription_registration_id, 100);
                assert_eq!(*stream_id, STREAM_ID_1);
                assert_eq!(channel, "aeron:ipc");
            }
            other => panic!("expected OnUnavailableImage, got {:?}", other),
        }

        assert_eq!(driver.conductor.client_count(), 1);
        assert_eq!(driver.conductor.publication_count(), 0);
        assert_eq!(driver.conductor.image_count(), 0);
    }

    #[test]
    fn test_remove_subscription_leaves_no_residual_images() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_subscription(client_id, 100, STREAM_ID_1);
        driver.add_ipc_publication(client_id, 200, STREAM_ID_1, false);
        driver.do_work();
        assert_eq!(driver.read_events().len(), 3);

        let correlation_id = driver.next_id();
        driver.send(encode::remove_subscription(client_id, correlation_id, 100));
        driver.do_work();

        assert!(driver.read_events().is_empty());
        assert_eq!(driver.conductor.subscription_count(), 0);
        assert_eq!(driver.conductor.image_count(), 0);
        // The publication set is unchanged by the subscription round trip.
        assert_eq!(driver.conductor.publication_count(), 1);
    }

    #[test]
    fn test_client_timeout_cascades() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_publication(client_id, 200, STREAM_ID_1, false);
        driver.add_ipc_subscription(client_id, 100, STREAM_ID_1);
        driver.add_ipc_subscription(client_id, 101, STREAM_ID_2);
        driver.do_work();
        assert_eq!(driver.conductor.client_count(), 1);
        assert_eq!(driver.read_events().len(), 4);

        // One duty cycle past the deadline removes the client and its
        // subscriptions; the publication lingers first, then unlinks.
        driver.advance_and_work(LIVENESS_TIMEOUT_NS + 1);
        assert_eq!(driver.conductor.client_count(), 0);
        assert_eq!(driver.conductor.subscription_count(), 0);

        driver.advance_and_work(LINGER_TIMEOUT_NS + 1);
        assert_eq!(driver.conductor.publication_count(), 0);
        assert_eq!(driver.conductor.image_count(), 0);
    }

    #[test]
    fn test_keepalive_prevents_timeout() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_subscription(client_id, 100, STREAM_ID_1);
        driver.do_work();

        for _ in 0..4 {
            driver.send(encode::client_keepalive(client_id));
            driver.advance_and_work(LIVENESS_TIMEOUT_NS / 2);
        }

        assert_eq!(driver.conductor.client_count(), 1);
        assert_eq!(driver.conductor.subscription_count(), 1);
    }

    #[test]
    fn test_session_id_filter() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_publication(client_id, 200, STREAM_ID_1, false);
        driver.do_work();
        let events = driver.read_events();
        let (_, session_id, _) = expect_publication_ready(&events[0], 200);

        // A filter on the live session links, any other filter does not.
        driver.send(encode::add_subscription(
            client_id,
            100,
            STREAM_ID_1,
            &format!("aeron:ipc?session-id={}", session_id),
        ));
        driver.send(encode::add_subscription(
            client_id,
            101,
            STREAM_ID_1,
            &format!("aeron:ipc?session-id={}", session_id.wrapping_add(1)),
        ));
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], DriverEvent::OnSubscriptionReady { correlation_id, .. } if correlation_id == 100));
        assert!(matches!(
            &events[1],
            DriverEvent::OnAvailableImage { subscription_registration_id, .. }
                if *subscription_registration_id == 100
        ));
        assert!(matches!(events[2], DriverEvent::OnSubscriptionReady { correlation_id, .. } if correlation_id == 101));
        assert_eq!(driver.conductor.image_count(), 1);
    }

    #[test]
    fn test_unknown_publication_error() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_subscription(client_id, 100, STREAM_ID_1);
        driver.do_work();
        driver.read_events();

        driver.send(encode::remove_publication(client_id, 300, 9999));
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DriverEvent::OnError {
                offending_correlation_id: 300,
                error_code: ErrorCode::UnknownPublication,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_channel_error() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.send(encode::add_publication(client_id, 200, STREAM_ID_1, "bogus:chan", false));
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DriverEvent::OnError {
                offending_correlation_id: 200,
                error_code: ErrorCode::InvalidChannel,
                ..
            }
        ));
        assert_eq!(driver.conductor.publication_count(), 0);
    }

    #[test]
    fn test_remove_from_unknown_client_errors() {
        let mut driver = TestDriver::new();

        driver.send(encode::remove_subscription(77, 300, 100));
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DriverEvent::OnError {
                error_code: ErrorCode::UnknownClient,
                ..
            }
        ));
    }

    #[test]
    fn test_rcv_destinations() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.send(encode::add_subscription(
            client_id,
            100,
            STREAM_ID_1,
            "aeron:udp?endpoint=127.0.0.1:8000",
        ));
        driver.do_work();
        assert_eq!(driver.read_events().len(), 1);

        let correlation_id = driver.next_id();
        driver.send(encode::add_rcv_destination(
            client_id,
            correlation_id,
            100,
            "aeron:udp?endpoint=127.0.0.1:9000",
        ));
        driver.do_work();
        assert!(driver.read_events().is_empty(), "destination add is silent");

        let correlation_id = driver.next_id();
        driver.send(encode::remove_rcv_destination(
            client_id,
            correlation_id,
            100,
            "aeron:udp?endpoint=127.0.0.1:9000",
        ));
        driver.do_work();
        assert!(driver.read_events().is_empty());

        // A destination for a subscription that does not exist.
        driver.send(encode::add_rcv_destination(
            client_id,
            555,
            9999,
            "aeron:udp?endpoint=127.0.0.1:9000",
        ));
        driver.do_work();
        let events = driver.read_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DriverEvent::OnError {
                offending_correlation_id: 555,
                error_code: ErrorCode::SubscriptionClosed,
                ..
            }
        ));
    }

    #[test]
    fn test_udp_publication_ready_without_local_images() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        // Network images originate in the receiver; the conductor only
        // links IPC publications locally.
        driver.send(encode::add_subscription(
            client_id,
            100,
            STREAM_ID_1,
            "aeron:udp?endpoint=127.0.0.1:8000",
        ));
        driver.send(encode::add_publication(
            client_id,
            200,
            STREAM_ID_1,
            "aeron:udp?endpoint=127.0.0.1:8000",
            false,
        ));
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DriverEvent::OnSubscriptionReady { .. }));
        expect_publication_ready(&events[1], 200);

        assert_eq!(driver.conductor.publication_count(), 1);
        assert_eq!(driver.conductor.image_count(), 0);
    }

    #[test]
    fn test_unresolvable_endpoint_error() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.send(encode::add_publication(
            client_id,
            200,
            STREAM_ID_1,
            "aeron:udp?endpoint=no-such-host.invalid:8000",
            false,
        ));
        driver.do_work();

        let events = driver.read_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DriverEvent::OnError {
                offending_correlation_id: 200,
                error_code: ErrorCode::NameUnresolvable,
                ..
            }
        ));
        assert_eq!(driver.conductor.publication_count(), 0);
    }

    #[test]
    fn test_counters_reflect_driver_state() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.add_ipc_subscription(client_id, 100, STREAM_ID_1);
        driver.add_ipc_publication(client_id, 200, STREAM_ID_1, false);
        driver.do_work();

        let reader = baton::CountersReader::new(
            driver._cnc.counters_metadata_buffer(),
            driver._cnc.counters_values_buffer(),
        );

        let mut labels = Vec::new();
        reader.for_each(|id, _type_id, _key, label| labels.push((id, label.to_string())));

        let find = |needle: &str| {
            labels
                .iter()
                .find(|(_, label)| label.contains(needle))
                .map(|(id, _)| *id)
                .unwrap_or_else(|| panic!("no counter labelled '{}'", needle))
        };

        assert_eq!(reader.counter_value(find("Active publications")).unwrap(), 1);
        assert_eq!(reader.counter_value(find("Active subscriptions")).unwrap(), 1);
        assert_eq!(reader.counter_value(find("Active images")).unwrap(), 1);

        let heartbeat = find(&format!("client-heartbeat: {}", client_id));
        assert_eq!(
            reader.counter_registration_id(heartbeat).unwrap(),
            client_id
        );
    }

    #[test]
    fn test_errors_reach_the_error_log() {
        let mut driver = TestDriver::new();
        let client_id = driver.next_id();

        driver.send(encode::add_publication(client_id, 200, STREAM_ID_1, "bogus:chan", false));
        driver.send(encode::add_publication(client_id, 201, STREAM_ID_1, "bogus:chan", false));
        driver.do_work();
        driver.read_events();

        let buffer = driver._cnc.error_log_buffer();
        let mut observations = Vec::new();
        let distinct = baton::read_error_log(&buffer, |count, _first, _last, description| {
            observations.push((count, description.to_string()))
        });

        assert_eq!(distinct, 1);
        assert_eq!(observations[0].0, 2);
        assert!(observations[0].1.contains("Invalid channel"));
    }
}
