// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! End-to-end reactor scenarios over a scripted in-memory socket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use reactormq::{
    Client, ConnectionSettings, Error, Message, ProtocolVersion, QoS, Reactor, Socket,
    SocketEvent, TopicFilter,
};

#[derive(Default)]
struct SocketScript {
    pending_events: VecDeque<SocketEvent>,
    written: Vec<Vec<u8>>,
    connect_succeeds: bool,
}

#[derive(Clone)]
struct ScriptHandle(Arc<Mutex<SocketScript>>);

impl ScriptHandle {
    fn new(connect_succeeds: bool) -> Self {
        Self(Arc::new(Mutex::new(SocketScript {
            connect_succeeds,
            ..SocketScript::default()
        })))
    }

    fn feed(&self, data: &[u8]) {
        self.0
            .lock()
            .unwrap()
            .pending_events
            .push_back(SocketEvent::DataReceived(data.to_vec()));
    }

    fn drop_connection(&self) {
        self.0
            .lock()
            .unwrap()
            .pending_events
            .push_back(SocketEvent::Disconnected);
    }

    fn written(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().written.clone()
    }

    fn clear_written(&self) {
        self.0.lock().unwrap().written.clear();
    }
}

struct ScriptedSocket(ScriptHandle);

impl Socket for ScriptedSocket {
    fn connect(&mut self) {
        let mut script = self.0 .0.lock().unwrap();
        let success = script.connect_succeeds;
        script
            .pending_events
            .push_back(SocketEvent::Connected(success));
    }

    fn send(&mut self, data: &[u8]) {
        self.0 .0.lock().unwrap().written.push(data.to_vec());
    }

    fn disconnect(&mut self) {
        self.0
             .0
            .lock()
            .unwrap()
            .pending_events
            .push_back(SocketEvent::Disconnected);
    }

    fn tick(&mut self) -> Vec<SocketEvent> {
        self.0 .0.lock().unwrap().pending_events.drain(..).collect()
    }
}

struct Harness {
    reactor: Reactor,
    client: Client,
    socket: ScriptHandle,
}

fn harness<F>(configure: F) -> Harness
where
    F: FnOnce(&mut ConnectionSettings),
{
    let _ = env_logger::builder().is_test(true).try_init();

    let socket = ScriptHandle::new(true);
    let factory_handle = socket.clone();

    let mut settings = ConnectionSettings::new("localhost", 1883);
    settings.set_client_id("c1");
    settings.set_socket_factory(Arc::new(
        move |_settings: &ConnectionSettings| -> Box<dyn Socket> {
            Box::new(ScriptedSocket(factory_handle.clone()))
        },
    ));
    configure(&mut settings);

    let reactor = Reactor::new(Arc::new(settings));
    let client = reactor.handle();
    Harness {
        reactor,
        client,
        socket,
    }
}

/// Drive the harness into the Ready state and clear the CONNECT bytes.
fn establish(harness: &mut Harness) {
    let mut rx = harness.client.connect(true);
    harness.reactor.tick();

    let conn_ack: &[u8] = match harness.reactor.context().protocol_version() {
        ProtocolVersion::V311 => &[0x20, 0x02, 0x00, 0x00],
        ProtocolVersion::V5 => &[0x20, 0x03, 0x00, 0x00, 0x00],
    };
    harness.socket.feed(conn_ack);
    harness.reactor.tick();

    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
    assert!(harness.reactor.is_connected());
    harness.socket.clear_written();
}

#[test]
fn connect_success_v5() {
    let mut h = harness(|_s| {});

    let connected = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&connected);
    h.reactor.context().on_connect().add(move |success| {
        observed.lock().unwrap().push(*success);
    });

    let mut rx = h.client.connect(true);
    h.reactor.tick();

    // The CONNECT packet went out during the same tick.
    let written = h.socket.written();
    assert_eq!(written.len(), 1);
    assert_eq!(
        &written[0][..13],
        &[0x10, 0x0f, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x02, 0x00, 0x3c, 0x00]
    );
    assert!(written[0].ends_with(&[0x00, 0x02, b'c', b'1']));

    h.socket.feed(&[0x20, 0x03, 0x00, 0x00, 0x00]);
    h.reactor.tick();

    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
    assert_eq!(h.reactor.state_name(), "Ready");
    assert_eq!(connected.lock().unwrap().as_slice(), &[true]);
}

#[test]
fn connect_success_v311() {
    let mut h = harness(|s| {
        s.set_protocol_version(ProtocolVersion::V311);
    });

    let mut rx = h.client.connect(true);
    h.reactor.tick();

    let written = h.socket.written();
    assert_eq!(written[0][8], 0x04);

    h.socket.feed(&[0x20, 0x02, 0x00, 0x00]);
    h.reactor.tick();
    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
    assert!(h.reactor.is_connected());
}

#[test]
fn connect_refused_by_broker() {
    let mut h = harness(|_s| {});

    let mut rx = h.client.connect(true);
    h.reactor.tick();

    // CONNACK with reason code 0x87 (not authorized).
    h.socket.feed(&[0x20, 0x03, 0x00, 0x87, 0x00]);
    h.reactor.tick();

    assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::ConnectionRefused)));
    assert_eq!(h.reactor.state_name(), "Disconnected");
}

#[test]
fn handshake_timeout() {
    let mut h = harness(|s| {
        s.set_connect_timeout_seconds(0);
    });

    let mut rx = h.client.connect(true);
    h.reactor.tick();
    assert_eq!(h.reactor.state_name(), "Connecting");

    thread::sleep(Duration::from_millis(5));
    h.reactor.tick();

    assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::HandshakeTimeout)));
    assert_eq!(h.reactor.state_name(), "Disconnected");
}

#[test]
fn broker_assigned_client_id_survives_for_reconnect() {
    let mut h = harness(|_s| {});

    let mut rx = h.client.connect(true);
    h.reactor.tick();
    h.socket.clear_written();

    // CONNACK carrying AssignedClientIdentifier "srv-1".
    h.socket.feed(&[
        0x20, 0x0b, 0x00, 0x00, 0x08, 0x12, 0x00, 0x05, b's', b'r', b'v', b'-', b'1',
    ]);
    h.reactor.tick();
    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
    assert_eq!(h.reactor.context().assigned_client_id(), "srv-1");

    // Drop and reconnect; the CONNECT must now carry the assigned id.
    h.socket.drop_connection();
    h.reactor.tick();
    let _rx2 = h.client.connect(false);
    h.reactor.tick();

    let written = h.socket.written();
    let connect = written.last().unwrap();
    assert!(connect.ends_with(&[0x00, 0x05, b's', b'r', b'v', b'-', b'1']));
}

#[test]
fn qos0_publish_resolves_immediately() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let mut rx = h
        .client
        .publish(Message::new("t", b"x", QoS::AtMostOnce, false));
    h.reactor.tick();

    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
    assert_eq!(h.socket.written().len(), 1);
}

#[test]
fn qos1_publish_roundtrip_v311() {
    let mut h = harness(|s| {
        s.set_protocol_version(ProtocolVersion::V311);
    });
    establish(&mut h);

    let mut rx = h
        .client
        .publish(Message::new("a/b", &[0x01], QoS::AtLeastOnce, false));
    h.reactor.tick();

    let written = h.socket.written();
    assert_eq!(
        &written[0],
        &[0x32, 0x08, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x01, 0x01]
    );
    assert!(rx.try_recv().unwrap().is_none());

    h.socket.feed(&[0x40, 0x02, 0x00, 0x01]);
    h.reactor.tick();
    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
}

#[test]
fn qos2_publish_runs_full_handshake() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let mut rx = h
        .client
        .publish(Message::new("x", b"p", QoS::ExactOnce, false));
    h.reactor.tick();
    h.socket.clear_written();

    // PUBREC keeps the operation pending and triggers PUBREL.
    h.socket.feed(&[0x50, 0x02, 0x00, 0x01]);
    h.reactor.tick();
    assert_eq!(h.socket.written(), vec![vec![0x62, 0x02, 0x00, 0x01]]);
    assert!(rx.try_recv().unwrap().is_none());

    // PUBCOMP is the terminal ack.
    h.socket.feed(&[0x70, 0x02, 0x00, 0x01]);
    h.reactor.tick();
    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
}

#[test]
fn qos1_publish_times_out_when_unacknowledged() {
    // The 30 s deadline cannot elapse inside a test; verify instead that
    // an unacknowledged publish stays pending across ticks.
    let mut h = harness(|_s| {});
    establish(&mut h);

    let mut rx = h
        .client
        .publish(Message::new("t", b"x", QoS::AtLeastOnce, false));
    for _ in 0..5 {
        h.reactor.tick();
    }
    assert!(rx.try_recv().unwrap().is_none());
}

#[test]
fn publish_fails_when_not_connected() {
    let mut h = harness(|_s| {});

    let mut rx = h
        .client
        .publish(Message::new("t", b"x", QoS::AtLeastOnce, false));
    h.reactor.tick();
    assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::NotConnected)));
}

#[test]
fn pending_command_cap_rejects_excess_publishes() {
    let mut h = harness(|s| {
        s.set_max_pending_commands(1);
    });
    establish(&mut h);

    let mut rx1 = h
        .client
        .publish(Message::new("a", b"1", QoS::AtLeastOnce, false));
    let mut rx2 = h
        .client
        .publish(Message::new("b", b"2", QoS::AtLeastOnce, false));
    h.reactor.tick();

    assert!(rx1.try_recv().unwrap().is_none());
    assert_eq!(rx2.try_recv().unwrap(), Some(Err(Error::MaxPendingCommands)));
}

#[test]
fn outbound_queue_cap_rejects_oversized_publish() {
    let mut h = harness(|s| {
        s.set_max_outbound_queue_bytes(10);
    });
    establish(&mut h);

    let mut rx = h
        .client
        .publish(Message::new("topic", b"payload", QoS::AtLeastOnce, false));
    h.reactor.tick();
    assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::OutboundQueueFull)));

    // The reserved packet id must have been released.
    let mut rx2 = h
        .client
        .publish(Message::new("t", b"", QoS::AtLeastOnce, false));
    h.reactor.tick();
    assert!(rx2.try_recv().unwrap().is_none());
    let written = h.socket.written();
    assert_eq!(written.last().unwrap()[..2], [0x32, 0x06][..]);
}

#[test]
fn subscribe_batch_resolution() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let mut rx = h.client.subscribe_many(vec![
        TopicFilter::new("a", QoS::AtLeastOnce),
        TopicFilter::new("b", QoS::ExactOnce),
        TopicFilter::new("c", QoS::AtMostOnce),
    ]);
    h.reactor.tick();

    // SUBACK: granted QoS 1, granted QoS 2, not authorized.
    h.socket.feed(&[0x90, 0x06, 0x00, 0x01, 0x00, 0x01, 0x02, 0x87]);
    h.reactor.tick();

    let results = rx.try_recv().unwrap().unwrap().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(
        results.iter().map(|r| (r.filter.as_str(), r.success)).collect::<Vec<_>>(),
        vec![("a", true), ("b", true), ("c", false)]
    );
}

#[test]
fn subscribe_single_resolution() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let mut rx = h.client.subscribe(TopicFilter::new("a/+", QoS::AtLeastOnce));
    h.reactor.tick();

    h.socket.feed(&[0x90, 0x04, 0x00, 0x01, 0x00, 0x01]);
    h.reactor.tick();

    let result = rx.try_recv().unwrap().unwrap().unwrap();
    assert_eq!(result.filter, "a/+");
    assert!(result.success);
}

#[test]
fn unsubscribe_resolution_v5() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let mut rx = h.client.unsubscribe("a/b");
    h.reactor.tick();

    // UNSUBACK with Success for the single filter.
    h.socket.feed(&[0xb0, 0x04, 0x00, 0x01, 0x00, 0x00]);
    h.reactor.tick();

    let results = rx.try_recv().unwrap().unwrap().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
}

#[test]
fn inbound_qos0_is_delivered_without_ack() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    h.reactor.context().on_message().add(move |message: &Message| {
        sink.lock().unwrap().push(message.clone());
    });

    h.socket.feed(&[0x30, 0x05, 0x00, 0x01, b't', 0x00, 0xff]);
    h.reactor.tick();

    let delivered = messages.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].topic(), "t");
    assert_eq!(delivered[0].payload(), &[0xff]);
    assert!(h.socket.written().is_empty());
}

#[test]
fn inbound_qos1_is_acked_and_delivered() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    h.reactor.context().on_message().add(move |message: &Message| {
        sink.lock().unwrap().push(message.clone());
    });

    // QoS 1 publish, packet id 3, empty v5 properties.
    h.socket
        .feed(&[0x32, 0x07, 0x00, 0x01, b't', 0x00, 0x03, 0x00, 0xaa]);
    h.reactor.tick();

    assert_eq!(messages.lock().unwrap().len(), 1);
    assert_eq!(h.socket.written(), vec![vec![0x40, 0x02, 0x00, 0x03]]);
}

#[test]
fn inbound_qos2_delivery_is_deferred_until_release() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    h.reactor.context().on_message().add(move |message: &Message| {
        sink.lock().unwrap().push(message.clone());
    });

    // QoS 2 publish, topic x/y, packet id 5.
    let publish = [
        0x34, 0x0a, 0x00, 0x03, b'x', b'/', b'y', 0x00, 0x05, 0x00, 0xca, 0xfe,
    ];
    h.socket.feed(&publish);
    h.reactor.tick();

    // PUBREC goes out, nothing is delivered yet.
    assert_eq!(h.socket.written(), vec![vec![0x50, 0x02, 0x00, 0x05]]);
    assert!(messages.lock().unwrap().is_empty());
    h.socket.clear_written();

    // A broker retransmission of the same id is dropped silently.
    h.socket.feed(&publish);
    h.reactor.tick();
    assert!(h.socket.written().is_empty());
    assert!(messages.lock().unwrap().is_empty());

    // PUBREL releases the message: PUBCOMP out, exactly one delivery.
    h.socket.feed(&[0x62, 0x02, 0x00, 0x05]);
    h.reactor.tick();
    assert_eq!(h.socket.written(), vec![vec![0x70, 0x02, 0x00, 0x05]]);
    let delivered = messages.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].topic(), "x/y");
    assert_eq!(delivered[0].payload(), &[0xca, 0xfe]);
    assert_eq!(delivered[0].qos(), QoS::ExactOnce);
}

#[test]
fn graceful_disconnect_resolves_and_notifies() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let disconnects = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&disconnects);
    h.reactor.context().on_disconnect().add(move |graceful| {
        sink.lock().unwrap().push(*graceful);
    });

    let mut rx = h.client.disconnect();
    h.reactor.tick();

    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
    assert_eq!(h.reactor.state_name(), "Disconnected");
    assert_eq!(h.socket.written(), vec![vec![0xe0, 0x00]]);
    assert_eq!(disconnects.lock().unwrap().as_slice(), &[true]);
}

#[test]
fn unexpected_drop_notifies_ungraceful() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let disconnects = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&disconnects);
    h.reactor.context().on_disconnect().add(move |graceful| {
        sink.lock().unwrap().push(*graceful);
    });

    h.socket.drop_connection();
    h.reactor.tick();

    assert_eq!(h.reactor.state_name(), "Disconnected");
    assert_eq!(disconnects.lock().unwrap().as_slice(), &[false]);
}

#[test]
fn pending_publish_is_retransmitted_with_dup_after_reconnect() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let mut rx = h
        .client
        .publish(Message::new("a/b", &[0x01], QoS::AtLeastOnce, false));
    h.reactor.tick();
    assert!(rx.try_recv().unwrap().is_none());

    // The transport drops before the ack arrives.
    h.socket.drop_connection();
    h.reactor.tick();
    assert_eq!(h.reactor.state_name(), "Disconnected");
    h.socket.clear_written();

    // Reconnect; entering Ready re-sends the publish with DUP set.
    let _rx2 = h.client.connect(false);
    h.reactor.tick();
    h.socket.feed(&[0x20, 0x03, 0x00, 0x00, 0x00]);
    h.reactor.tick();

    let written = h.socket.written();
    let republish = written.last().unwrap();
    assert_eq!(republish[0], 0x3a);

    // The original promise resolves once the ack finally arrives.
    h.socket.feed(&[0x40, 0x02, 0x00, 0x01]);
    h.reactor.tick();
    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
}

#[test]
fn keepalive_sends_ping_request() {
    let mut h = harness(|s| {
        s.set_keep_alive_interval_seconds(1);
    });
    establish(&mut h);

    thread::sleep(Duration::from_millis(1100));
    h.reactor.tick();

    assert_eq!(h.socket.written(), vec![vec![0xc0, 0x00]]);

    // PINGRESP clears the pending flag; no second ping goes out while the
    // activity clock is fresh.
    h.socket.feed(&[0xd0, 0x00]);
    h.reactor.tick();
    h.reactor.tick();
    assert_eq!(h.socket.written().len(), 1);
}

#[test]
fn auto_reconnect_schedules_retry_with_backoff() {
    let mut h = harness(|s| {
        s.set_auto_reconnect_enabled(true);
        s.set_auto_reconnect_initial_delay_ms(5);
        s.set_auto_reconnect_max_delay_ms(50);
        s.set_auto_reconnect_multiplier(2.0);
    });
    establish(&mut h);
    h.socket.clear_written();

    h.socket.drop_connection();
    h.reactor.tick();
    assert_eq!(h.reactor.state_name(), "Disconnected");

    // Within the backoff window nothing happens.
    h.reactor.tick();
    assert!(h.socket.written().is_empty());

    // Past the jittered delay the reactor dials out again on its own.
    thread::sleep(Duration::from_millis(20));
    h.reactor.tick();
    assert_eq!(h.reactor.state_name(), "Connecting");
    let written = h.socket.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0][0], 0x10);
}

#[test]
fn strict_mode_drops_session_on_unexpected_packet() {
    let mut h = harness(|s| {
        s.set_strict_mode(true);
    });
    establish(&mut h);

    // A second CONNACK is a protocol violation once Ready.
    h.socket.feed(&[0x20, 0x03, 0x00, 0x00, 0x00]);
    h.reactor.tick();
    assert_eq!(h.reactor.state_name(), "Disconnected");
}

#[test]
fn graceful_close_cancels_pending_operations() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    let mut publish_rx = h
        .client
        .publish(Message::new("t", b"x", QoS::AtLeastOnce, false));
    h.reactor.tick();
    assert!(publish_rx.try_recv().unwrap().is_none());

    let mut rx = h.client.disconnect();
    h.reactor.tick();

    assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
    assert_eq!(
        publish_rx.try_recv().unwrap(),
        Some(Err(Error::ConnectionInterrupted))
    );
}

#[test]
fn commands_fail_while_closing() {
    let mut h = harness(|_s| {});
    establish(&mut h);

    // Queue a disconnect and a publish in the same tick; the publish is
    // drained after the session has entered Closing.
    let _disconnect_rx = h.client.disconnect();
    let mut publish_rx = h
        .client
        .publish(Message::new("t", b"x", QoS::AtMostOnce, false));
    h.reactor.tick();

    assert_eq!(
        publish_rx.try_recv().unwrap(),
        Some(Err(Error::PublishWhileClosing))
    );
}
