// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use codec::{v3, v5, ByteArray, DecodePacket, PacketId, ProtocolVersion};

use crate::command::{
    resolve, PublishCommand, SubscribeCommand, SubscribesCommand, UnsubscribesCommand,
};
use crate::delegates::MulticastDelegate;
use crate::error::Error;
use crate::message::{Message, SubscribeResult, UnsubscribeResult};
use crate::settings::ConnectionSettings;
use crate::socket::Socket;
use crate::wire::{self, ControlPacket};

const MAX_PACKET_ID: usize = 65535;

#[derive(Debug, Default)]
struct PacketIdPool {
    next_id: u16,
    in_use: HashSet<u16>,
}

/// Shared per-connection state used by the reactor thread.
///
/// Everything here is touched only from the reactor thread, except the
/// packet id pool which has its own lock so user threads can observe
/// allocation state.
pub struct Context {
    socket: Option<Box<dyn Socket>>,

    settings: Arc<ConnectionSettings>,

    protocol_version: ProtocolVersion,

    assigned_client_id: String,

    packet_ids: Mutex<PacketIdPool>,

    outbound_queue_size: usize,

    on_connect: MulticastDelegate<bool>,
    on_disconnect: MulticastDelegate<bool>,
    on_publish: MulticastDelegate<PacketId>,
    on_subscribe: MulticastDelegate<Vec<SubscribeResult>>,
    on_unsubscribe: MulticastDelegate<Vec<UnsubscribeResult>>,
    on_message: MulticastDelegate<Message>,

    pending_publishes: HashMap<PacketId, PublishCommand>,
    pending_subscribes: HashMap<PacketId, SubscribeCommand>,
    pending_subscribes_multi: HashMap<PacketId, SubscribesCommand>,
    pending_unsubscribes: HashMap<PacketId, UnsubscribesCommand>,

    /// Inbound QoS 2 messages that have been PUBREC'd and await PUBREL.
    pending_incoming_qos2: HashMap<PacketId, Message>,

    last_activity_time: Instant,

    ping_pending: bool,

    /// Sent times of QoS 1/2 publishes, for timeout detection.
    publish_sent_times: HashMap<PacketId, Instant>,

    /// Inbound packet ids currently in flight, for duplicate detection.
    /// Disjoint from the outbound pool; MQTT scopes ids per direction.
    incoming_packet_ids: HashSet<PacketId>,
}

impl Context {
    #[must_use]
    pub fn new(settings: Arc<ConnectionSettings>) -> Self {
        let protocol_version = settings.protocol_version();
        Self {
            socket: None,
            settings,
            protocol_version,
            assigned_client_id: String::new(),
            packet_ids: Mutex::new(PacketIdPool {
                next_id: 1,
                in_use: HashSet::new(),
            }),
            outbound_queue_size: 0,
            on_connect: MulticastDelegate::new(),
            on_disconnect: MulticastDelegate::new(),
            on_publish: MulticastDelegate::new(),
            on_subscribe: MulticastDelegate::new(),
            on_unsubscribe: MulticastDelegate::new(),
            on_message: MulticastDelegate::new(),
            pending_publishes: HashMap::new(),
            pending_subscribes: HashMap::new(),
            pending_subscribes_multi: HashMap::new(),
            pending_unsubscribes: HashMap::new(),
            pending_incoming_qos2: HashMap::new(),
            last_activity_time: Instant::now(),
            ping_pending: false,
            publish_sent_times: HashMap::new(),
            incoming_packet_ids: HashSet::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<ConnectionSettings> {
        &self.settings
    }

    #[must_use]
    pub const fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.protocol_version = version;
    }

    #[must_use]
    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }

    pub fn set_socket(&mut self, socket: Option<Box<dyn Socket>>) {
        self.socket = socket;
    }

    pub fn socket_mut(&mut self) -> Option<&mut Box<dyn Socket>> {
        self.socket.as_mut()
    }

    /// Write an encoded packet to the socket, if one exists.
    pub fn send_packet(&mut self, data: &[u8]) {
        if let Some(socket) = self.socket.as_mut() {
            socket.send(data);
        }
    }

    /// Allocate a packet id from the pool, scanning forward from the
    /// cursor. Returns `None` when all 65535 ids are in flight.
    ///
    /// # Panics
    ///
    /// Panics if the pool lock is poisoned.
    pub fn allocate_packet_id(&self) -> Option<PacketId> {
        let mut pool = self.packet_ids.lock().unwrap();
        if pool.in_use.len() >= MAX_PACKET_ID {
            return None;
        }

        for _ in 0..MAX_PACKET_ID {
            let candidate = pool.next_id;
            pool.next_id = pool.next_id.wrapping_add(1);
            if pool.next_id == 0 {
                pool.next_id = 1;
            }

            if !pool.in_use.contains(&candidate) {
                pool.in_use.insert(candidate);
                return Some(PacketId::new(candidate));
            }
        }

        None
    }

    /// Release a packet id back to the pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool lock is poisoned.
    pub fn release_packet_id(&self, packet_id: PacketId) {
        self.packet_ids.lock().unwrap().in_use.remove(&packet_id.value());
    }

    /// Check whether a packet id is currently allocated.
    ///
    /// # Panics
    ///
    /// Panics if the pool lock is poisoned.
    #[must_use]
    pub fn is_packet_id_in_use(&self, packet_id: PacketId) -> bool {
        self.packet_ids.lock().unwrap().in_use.contains(&packet_id.value())
    }

    #[must_use]
    pub const fn outbound_queue_size(&self) -> usize {
        self.outbound_queue_size
    }

    /// Check whether adding `bytes` would exceed the outbound limit.
    #[must_use]
    pub fn can_add_to_outbound_queue(&self, bytes: usize) -> bool {
        self.outbound_queue_size + bytes <= self.settings.max_outbound_queue_bytes()
    }

    pub fn add_outbound_queue_size(&mut self, bytes: usize) {
        self.outbound_queue_size += bytes;
    }

    /// Decrease the outbound accounting; saturates at zero.
    pub fn subtract_outbound_queue_size(&mut self, bytes: usize) {
        self.outbound_queue_size = self.outbound_queue_size.saturating_sub(bytes);
    }

    #[must_use]
    pub const fn on_connect(&self) -> &MulticastDelegate<bool> {
        &self.on_connect
    }

    #[must_use]
    pub const fn on_disconnect(&self) -> &MulticastDelegate<bool> {
        &self.on_disconnect
    }

    #[must_use]
    pub const fn on_publish(&self) -> &MulticastDelegate<PacketId> {
        &self.on_publish
    }

    #[must_use]
    pub const fn on_subscribe(&self) -> &MulticastDelegate<Vec<SubscribeResult>> {
        &self.on_subscribe
    }

    #[must_use]
    pub const fn on_unsubscribe(&self) -> &MulticastDelegate<Vec<UnsubscribeResult>> {
        &self.on_unsubscribe
    }

    #[must_use]
    pub const fn on_message(&self) -> &MulticastDelegate<Message> {
        &self.on_message
    }

    /// Run `callback` through the settings-provided executor, or inline on
    /// the reactor thread when none is configured.
    pub fn invoke_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(executor) = self.settings.callback_executor() {
            executor(Box::new(callback));
        } else {
            callback();
        }
    }

    /// Parse one complete control packet from raw bytes, using the
    /// negotiated protocol version. Returns `None` on any malformation.
    #[must_use]
    pub fn parse_packet(&self, data: &[u8]) -> Option<ControlPacket> {
        if data.len() < 2 {
            log::error!("context: insufficient packet data (size: {})", data.len());
            return None;
        }

        if self.settings.enforce_max_packet_size() && data.len() > self.settings.max_packet_size() {
            log::error!(
                "context: packet size ({} bytes) exceeds maximum allowed ({} bytes)",
                data.len(),
                self.settings.max_packet_size()
            );
            return None;
        }

        let mut ba = ByteArray::new(data);
        let result = match self.protocol_version {
            ProtocolVersion::V311 => v3::Packet::decode(&mut ba).map(ControlPacket::V3),
            ProtocolVersion::V5 => v5::Packet::decode(&mut ba).map(ControlPacket::V5),
        };

        match result {
            Ok(packet) => {
                log::debug!(
                    "context: received packet type {:?}, id {:?}",
                    packet.packet_type(),
                    packet.packet_id()
                );
                Some(packet)
            }
            Err(err) => {
                log::error!("context: failed to parse packet: {err:?}");
                None
            }
        }
    }

    pub fn store_pending_publish(&mut self, packet_id: PacketId, command: PublishCommand) {
        self.pending_publishes.insert(packet_id, command);
    }

    pub fn take_pending_publish(&mut self, packet_id: PacketId) -> Option<PublishCommand> {
        self.pending_publishes.remove(&packet_id)
    }

    /// Ids of publishes currently awaiting acknowledgment.
    #[must_use]
    pub fn pending_publish_ids(&self) -> Vec<PacketId> {
        self.pending_publishes.keys().copied().collect()
    }

    pub fn store_pending_subscribe(&mut self, packet_id: PacketId, command: SubscribeCommand) {
        self.pending_subscribes.insert(packet_id, command);
    }

    pub fn take_pending_subscribe(&mut self, packet_id: PacketId) -> Option<SubscribeCommand> {
        self.pending_subscribes.remove(&packet_id)
    }

    pub fn store_pending_subscribes(&mut self, packet_id: PacketId, command: SubscribesCommand) {
        self.pending_subscribes_multi.insert(packet_id, command);
    }

    pub fn take_pending_subscribes(&mut self, packet_id: PacketId) -> Option<SubscribesCommand> {
        self.pending_subscribes_multi.remove(&packet_id)
    }

    pub fn store_pending_unsubscribes(&mut self, packet_id: PacketId, command: UnsubscribesCommand) {
        self.pending_unsubscribes.insert(packet_id, command);
    }

    pub fn take_pending_unsubscribes(&mut self, packet_id: PacketId) -> Option<UnsubscribesCommand> {
        self.pending_unsubscribes.remove(&packet_id)
    }

    pub fn store_pending_incoming_qos2(&mut self, packet_id: PacketId, message: Message) {
        self.pending_incoming_qos2.insert(packet_id, message);
    }

    pub fn take_pending_incoming_qos2(&mut self, packet_id: PacketId) -> Option<Message> {
        self.pending_incoming_qos2.remove(&packet_id)
    }

    /// Record activity for keepalive tracking.
    pub fn record_activity(&mut self) {
        self.last_activity_time = Instant::now();
    }

    #[must_use]
    pub fn time_since_last_activity(&self) -> Duration {
        self.last_activity_time.elapsed()
    }

    #[must_use]
    pub const fn is_ping_pending(&self) -> bool {
        self.ping_pending
    }

    pub fn set_ping_pending(&mut self, pending: bool) {
        self.ping_pending = pending;
    }

    /// Record when a `QoS` 1/2 publish was sent, for timeout tracking.
    pub fn record_publish_sent(&mut self, packet_id: PacketId) {
        self.publish_sent_times.insert(packet_id, Instant::now());
    }

    /// Elapsed time since a publish was sent; zero if unknown.
    #[must_use]
    pub fn publish_elapsed_time(&self, packet_id: PacketId) -> Duration {
        self.publish_sent_times
            .get(&packet_id)
            .map_or(Duration::ZERO, Instant::elapsed)
    }

    pub fn clear_publish_timeout(&mut self, packet_id: PacketId) {
        self.publish_sent_times.remove(&packet_id);
    }

    /// Re-send every pending `QoS` 1/2 publish with the DUP flag set.
    /// Used on session resumption after a reconnect.
    pub fn retransmit_pending_publishes(&mut self) {
        if self.socket.is_none() {
            return;
        }

        let mut encoded = Vec::with_capacity(self.pending_publishes.len());
        for (packet_id, command) in &self.pending_publishes {
            match wire::encode_publish(self.protocol_version, &command.message, *packet_id, true) {
                Ok(buf) => encoded.push((*packet_id, buf)),
                Err(err) => {
                    log::error!("context: failed to re-encode publish {packet_id}: {err:?}");
                }
            }
        }

        for (packet_id, buf) in encoded {
            self.send_packet(&buf);
            self.record_publish_sent(packet_id);
        }
    }

    /// Track an inbound `QoS` 1/2 packet id; returns false on a duplicate.
    pub fn track_incoming_packet_id(&mut self, packet_id: PacketId) -> bool {
        self.incoming_packet_ids.insert(packet_id)
    }

    pub fn release_incoming_packet_id(&mut self, packet_id: PacketId) {
        self.incoming_packet_ids.remove(&packet_id);
    }

    #[must_use]
    pub fn has_incoming_packet_id(&self, packet_id: PacketId) -> bool {
        self.incoming_packet_ids.contains(&packet_id)
    }

    /// Fail every operation still awaiting acknowledgment and reset the
    /// per-session bookkeeping. Used when a graceful close completes;
    /// an unexpected drop instead keeps pending publishes for
    /// retransmission.
    pub fn cancel_all_pending(&mut self, error: Error) {
        for (packet_id, command) in self.pending_publishes.drain() {
            resolve(command.promise, Err(error));
            self.publish_sent_times.remove(&packet_id);
            self.packet_ids.lock().unwrap().in_use.remove(&packet_id.value());
        }
        for (packet_id, command) in self.pending_subscribes.drain() {
            resolve(command.promise, Err(error));
            self.packet_ids.lock().unwrap().in_use.remove(&packet_id.value());
        }
        for (packet_id, command) in self.pending_subscribes_multi.drain() {
            resolve(command.promise, Err(error));
            self.packet_ids.lock().unwrap().in_use.remove(&packet_id.value());
        }
        for (packet_id, command) in self.pending_unsubscribes.drain() {
            resolve(command.promise, Err(error));
            self.packet_ids.lock().unwrap().in_use.remove(&packet_id.value());
        }

        self.pending_incoming_qos2.clear();
        self.incoming_packet_ids.clear();
    }

    /// Count of commands awaiting acknowledgment.
    #[must_use]
    pub fn pending_command_count(&self) -> usize {
        self.pending_publishes.len()
            + self.pending_subscribes.len()
            + self.pending_subscribes_multi.len()
            + self.pending_unsubscribes.len()
    }

    /// Whether one more pending command fits under the configured cap.
    #[must_use]
    pub fn can_add_pending_command(&self) -> bool {
        self.pending_command_count() < self.settings.max_pending_commands()
    }

    #[must_use]
    pub fn assigned_client_id(&self) -> &str {
        &self.assigned_client_id
    }

    pub fn set_assigned_client_id(&mut self, client_id: String) {
        self.assigned_client_id = client_id;
    }

    /// The client id to put in the next CONNECT: the broker-assigned id
    /// when one exists, else the configured id.
    #[must_use]
    pub fn effective_client_id(&self) -> &str {
        if self.assigned_client_id.is_empty() {
            self.settings.client_id()
        } else {
            &self.assigned_client_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::QoS;
    use futures::channel::oneshot;

    fn test_context() -> Context {
        Context::new(Arc::new(ConnectionSettings::default()))
    }

    #[test]
    fn test_allocator_never_returns_zero() {
        let ctx = test_context();
        for _ in 0..200 {
            let id = ctx.allocate_packet_id().unwrap();
            assert_ne!(id.value(), 0);
        }
    }

    #[test]
    fn test_allocator_skips_ids_in_use() {
        let ctx = test_context();
        let first = ctx.allocate_packet_id().unwrap();
        let second = ctx.allocate_packet_id().unwrap();
        assert_ne!(first, second);
        assert!(ctx.is_packet_id_in_use(first));

        ctx.release_packet_id(first);
        assert!(!ctx.is_packet_id_in_use(first));
    }

    #[test]
    fn test_allocator_exhaustion() {
        let ctx = test_context();
        for _ in 0..65535 {
            assert!(ctx.allocate_packet_id().is_some());
        }
        assert!(ctx.allocate_packet_id().is_none());
    }

    #[test]
    fn test_outbound_accounting_saturates() {
        let mut ctx = test_context();
        ctx.add_outbound_queue_size(10);
        ctx.subtract_outbound_queue_size(100);
        assert_eq!(ctx.outbound_queue_size(), 0);
    }

    #[test]
    fn test_outbound_limit() {
        let mut settings = ConnectionSettings::default();
        settings.set_max_outbound_queue_bytes(8);
        let mut ctx = Context::new(Arc::new(settings));
        assert!(ctx.can_add_to_outbound_queue(8));
        ctx.add_outbound_queue_size(5);
        assert!(!ctx.can_add_to_outbound_queue(4));
    }

    #[test]
    fn test_incoming_id_duplicate_detection() {
        let mut ctx = test_context();
        let id = PacketId::new(5);
        assert!(ctx.track_incoming_packet_id(id));
        assert!(!ctx.track_incoming_packet_id(id));
        ctx.release_incoming_packet_id(id);
        assert!(ctx.track_incoming_packet_id(id));
    }

    #[test]
    fn test_pending_command_cap() {
        let mut settings = ConnectionSettings::default();
        settings.set_max_pending_commands(1);
        let mut ctx = Context::new(Arc::new(settings));
        assert!(ctx.can_add_pending_command());

        let (tx, _rx) = oneshot::channel();
        ctx.store_pending_publish(
            PacketId::new(1),
            PublishCommand {
                message: Message::new("t", &[], QoS::AtLeastOnce, false),
                promise: tx,
            },
        );
        assert!(!ctx.can_add_pending_command());
    }

    #[test]
    fn test_effective_client_id_prefers_assignment() {
        let mut settings = ConnectionSettings::default();
        settings.set_client_id("configured");
        let mut ctx = Context::new(Arc::new(settings));
        assert_eq!(ctx.effective_client_id(), "configured");

        ctx.set_assigned_client_id("broker-given".to_string());
        assert_eq!(ctx.effective_client_id(), "broker-given");
    }

    #[test]
    fn test_parse_packet_rejects_short_input() {
        let ctx = test_context();
        assert!(ctx.parse_packet(&[0x20]).is_none());
    }

    #[test]
    fn test_parse_packet_enforces_max_size() {
        let mut settings = ConnectionSettings::default();
        settings.set_max_packet_size(3);
        settings.set_enforce_max_packet_size(true);
        let ctx = Context::new(Arc::new(settings));
        assert!(ctx.parse_packet(&[0x20, 0x03, 0x00, 0x00, 0x00]).is_none());
    }

    #[test]
    fn test_parse_packet_rejects_auth_in_v311() {
        let mut ctx = test_context();
        ctx.set_protocol_version(ProtocolVersion::V311);
        assert!(ctx.parse_packet(&[0xf0, 0x00]).is_none());
    }

    #[test]
    fn test_parse_packet_v5_connect_ack() {
        let ctx = test_context();
        let packet = ctx.parse_packet(&[0x20, 0x03, 0x00, 0x00, 0x00]).unwrap();
        assert!(matches!(
            packet,
            ControlPacket::V5(v5::Packet::ConnectAck(_))
        ));
    }
}
