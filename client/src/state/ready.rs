// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

use codec::{v3, v5, PacketId, QoS};

use super::ack::{self, SubAckCodes};
use super::{incoming_publish, ClosingState, DisconnectedState, State, Transition};
use crate::command::{resolve, Command, PublishCommand, SubscribeCommand, SubscribesCommand, UnsubscribesCommand};
use crate::context::Context;
use crate::error::Error;
use crate::wire::{self, ControlPacket};

/// Deadline for a `QoS` > 0 publish to be acknowledged.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// A session is established. Commands flow out, acknowledgments and
/// messages flow in, and the tick supervises keepalive and publish
/// deadlines.
#[derive(Default)]
pub struct ReadyState;

impl ReadyState {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn handle_publish_command(ctx: &mut Context, command: PublishCommand) -> Transition {
        let qos = command.message.qos();

        let packet_id = if qos == QoS::AtMostOnce {
            PacketId::default()
        } else {
            if !ctx.can_add_pending_command() {
                resolve(command.promise, Err(Error::MaxPendingCommands));
                return Transition::Stay;
            }
            match ctx.allocate_packet_id() {
                Some(id) => id,
                None => {
                    resolve(command.promise, Err(Error::PacketIdPoolExhausted));
                    return Transition::Stay;
                }
            }
        };

        let buf = match wire::encode_publish(ctx.protocol_version(), &command.message, packet_id, false)
        {
            Ok(buf) => buf,
            Err(err) => {
                log::error!("ready: failed to encode PUBLISH: {err:?}");
                if qos != QoS::AtMostOnce {
                    ctx.release_packet_id(packet_id);
                }
                resolve(command.promise, Err(Error::EncodingFailed));
                return Transition::Stay;
            }
        };

        let packet_size = buf.len();
        if !ctx.can_add_to_outbound_queue(packet_size) {
            if qos != QoS::AtMostOnce {
                ctx.release_packet_id(packet_id);
            }
            resolve(command.promise, Err(Error::OutboundQueueFull));
            return Transition::Stay;
        }

        ctx.add_outbound_queue_size(packet_size);
        ctx.send_packet(&buf);

        if qos == QoS::AtMostOnce {
            resolve(command.promise, Ok(()));
        } else {
            ctx.store_pending_publish(packet_id, command);
            ctx.record_publish_sent(packet_id);
        }
        ctx.subtract_outbound_queue_size(packet_size);

        Transition::Stay
    }

    fn handle_subscribe_command(ctx: &mut Context, command: SubscribeCommand) -> Transition {
        if !ctx.can_add_pending_command() {
            resolve(command.promise, Err(Error::MaxPendingCommands));
            return Transition::Stay;
        }
        let Some(packet_id) = ctx.allocate_packet_id() else {
            resolve(command.promise, Err(Error::PacketIdPoolExhausted));
            return Transition::Stay;
        };

        let filters = std::slice::from_ref(&command.filter);
        match wire::encode_subscribe(ctx.protocol_version(), filters, packet_id) {
            Ok(buf) => {
                ctx.send_packet(&buf);
                ctx.store_pending_subscribe(packet_id, command);
            }
            Err(err) => {
                log::error!("ready: failed to encode SUBSCRIBE: {err:?}");
                ctx.release_packet_id(packet_id);
                resolve(command.promise, Err(Error::EncodingFailed));
            }
        }
        Transition::Stay
    }

    fn handle_subscribes_command(ctx: &mut Context, command: SubscribesCommand) -> Transition {
        if !ctx.can_add_pending_command() {
            resolve(command.promise, Err(Error::MaxPendingCommands));
            return Transition::Stay;
        }
        let Some(packet_id) = ctx.allocate_packet_id() else {
            resolve(command.promise, Err(Error::PacketIdPoolExhausted));
            return Transition::Stay;
        };

        match wire::encode_subscribe(ctx.protocol_version(), &command.filters, packet_id) {
            Ok(buf) => {
                ctx.send_packet(&buf);
                ctx.store_pending_subscribes(packet_id, command);
            }
            Err(err) => {
                log::error!("ready: failed to encode SUBSCRIBE: {err:?}");
                ctx.release_packet_id(packet_id);
                resolve(command.promise, Err(Error::EncodingFailed));
            }
        }
        Transition::Stay
    }

    fn handle_unsubscribes_command(ctx: &mut Context, command: UnsubscribesCommand) -> Transition {
        if !ctx.can_add_pending_command() {
            resolve(command.promise, Err(Error::MaxPendingCommands));
            return Transition::Stay;
        }
        let Some(packet_id) = ctx.allocate_packet_id() else {
            resolve(command.promise, Err(Error::PacketIdPoolExhausted));
            return Transition::Stay;
        };

        match wire::encode_unsubscribe(ctx.protocol_version(), &command.topics, packet_id) {
            Ok(buf) => {
                ctx.send_packet(&buf);
                ctx.store_pending_unsubscribes(packet_id, command);
            }
            Err(err) => {
                log::error!("ready: failed to encode UNSUBSCRIBE: {err:?}");
                ctx.release_packet_id(packet_id);
                resolve(command.promise, Err(Error::EncodingFailed));
            }
        }
        Transition::Stay
    }

    fn handle_publish_terminal_ack(ctx: &mut Context, packet_id: PacketId) -> Transition {
        ctx.clear_publish_timeout(packet_id);

        if let Some(command) = ctx.take_pending_publish(packet_id) {
            ctx.release_packet_id(packet_id);
            resolve(command.promise, Ok(()));

            let delegate = ctx.on_publish().clone();
            ctx.invoke_callback(move || {
                delegate.broadcast(&packet_id);
            });
        }

        Transition::Stay
    }

    fn handle_sub_ack(ctx: &mut Context, packet_id: PacketId, codes: &SubAckCodes) -> Transition {
        let single = ctx.take_pending_subscribe(packet_id);
        let multi = ctx.take_pending_subscribes(packet_id);
        if single.is_none() && multi.is_none() {
            return Transition::Stay;
        }

        ctx.release_packet_id(packet_id);
        if let Some(results) = ack::resolve_subscription(codes, single, multi) {
            let delegate = ctx.on_subscribe().clone();
            ctx.invoke_callback(move || {
                delegate.broadcast(&results);
            });
        }

        Transition::Stay
    }

    fn handle_unsub_ack(
        ctx: &mut Context,
        packet_id: PacketId,
        codes: Option<&[v5::ReasonCode]>,
    ) -> Transition {
        if let Some(command) = ctx.take_pending_unsubscribes(packet_id) {
            ctx.release_packet_id(packet_id);
            let results = ack::resolve_unsubscription(codes, command);

            let delegate = ctx.on_unsubscribe().clone();
            ctx.invoke_callback(move || {
                delegate.broadcast(&results);
            });
        }

        Transition::Stay
    }

    fn handle_pub_rec(ctx: &mut Context, packet_id: PacketId) -> Transition {
        // The publish stays pending until PUBCOMP.
        match wire::encode_publish_release(ctx.protocol_version(), packet_id) {
            Ok(buf) => ctx.send_packet(&buf),
            Err(err) => log::error!("ready: failed to encode PUBREL: {err:?}"),
        }
        Transition::Stay
    }

    fn handle_pub_rel(ctx: &mut Context, packet_id: PacketId) -> Transition {
        if let Some(message) = ctx.take_pending_incoming_qos2(packet_id) {
            match wire::encode_publish_complete(ctx.protocol_version(), packet_id) {
                Ok(buf) => ctx.send_packet(&buf),
                Err(err) => log::error!("ready: failed to encode PUBCOMP: {err:?}"),
            }

            let delegate = ctx.on_message().clone();
            ctx.invoke_callback(move || {
                delegate.broadcast(&message);
            });

            ctx.release_incoming_packet_id(packet_id);
        }

        Transition::Stay
    }

    fn handle_ping_resp(ctx: &mut Context) -> Transition {
        ctx.set_ping_pending(false);
        ctx.record_activity();
        Transition::Stay
    }

    fn strict_mode_violation(ctx: &Context) -> Transition {
        if ctx.settings().strict_mode() {
            Transition::to(DisconnectedState::new(false))
        } else {
            Transition::Stay
        }
    }
}

impl State for ReadyState {
    fn name(&self) -> &'static str {
        "Ready"
    }

    fn on_enter(&mut self, ctx: &mut Context) -> Transition {
        let delegate = ctx.on_connect().clone();
        ctx.invoke_callback(move || {
            delegate.broadcast(&true);
        });
        ctx.record_activity();

        // Session resumption: anything unacknowledged goes out again,
        // marked as a duplicate delivery.
        ctx.retransmit_pending_publishes();

        Transition::Stay
    }

    fn on_exit(&mut self, ctx: &mut Context) {
        ctx.set_ping_pending(false);
    }

    fn handle_command(&mut self, ctx: &mut Context, command: Command) -> Transition {
        if !ctx.has_socket() {
            log::warn!("ready: command dropped, no socket attached");
            return Transition::Stay;
        }

        match command {
            Command::Publish(cmd) => Self::handle_publish_command(ctx, cmd),
            Command::Subscribe(cmd) => Self::handle_subscribe_command(ctx, cmd),
            Command::Subscribes(cmd) => Self::handle_subscribes_command(ctx, cmd),
            Command::Unsubscribes(cmd) => Self::handle_unsubscribes_command(ctx, cmd),
            Command::Disconnect { promise } => Transition::to(ClosingState::new(promise)),
            Command::Connect { .. } | Command::CloseSocket => Transition::Stay,
        }
    }

    fn on_socket_disconnected(&mut self, _ctx: &mut Context) -> Transition {
        Transition::to(DisconnectedState::new(false))
    }

    fn on_data_received(&mut self, ctx: &mut Context, data: &[u8]) -> Transition {
        let Some(packet) = ctx.parse_packet(data) else {
            return Self::strict_mode_violation(ctx);
        };

        match packet {
            ControlPacket::V3(v3::Packet::PublishAck(ack)) => {
                Self::handle_publish_terminal_ack(ctx, ack.packet_id())
            }
            ControlPacket::V5(v5::Packet::PublishAck(ack)) => {
                Self::handle_publish_terminal_ack(ctx, ack.packet_id())
            }
            ControlPacket::V3(v3::Packet::PublishComplete(ack)) => {
                Self::handle_publish_terminal_ack(ctx, ack.packet_id())
            }
            ControlPacket::V5(v5::Packet::PublishComplete(ack)) => {
                Self::handle_publish_terminal_ack(ctx, ack.packet_id())
            }
            ControlPacket::V3(v3::Packet::SubscribeAck(ack)) => {
                let codes = SubAckCodes::V3(ack.acks().to_vec());
                Self::handle_sub_ack(ctx, ack.packet_id(), &codes)
            }
            ControlPacket::V5(v5::Packet::SubscribeAck(ack)) => {
                let codes = SubAckCodes::V5(ack.reason_codes().to_vec());
                Self::handle_sub_ack(ctx, ack.packet_id(), &codes)
            }
            ControlPacket::V3(v3::Packet::UnsubscribeAck(ack)) => {
                Self::handle_unsub_ack(ctx, ack.packet_id(), None)
            }
            ControlPacket::V5(v5::Packet::UnsubscribeAck(ack)) => {
                Self::handle_unsub_ack(ctx, ack.packet_id(), Some(ack.reason_codes()))
            }
            ControlPacket::V3(v3::Packet::Publish(publish)) => incoming_publish::handle(
                ctx,
                publish.topic(),
                publish.payload(),
                publish.qos(),
                publish.retain(),
                publish.packet_id(),
            ),
            ControlPacket::V5(v5::Packet::Publish(publish)) => incoming_publish::handle(
                ctx,
                publish.topic(),
                publish.payload(),
                publish.qos(),
                publish.retain(),
                publish.packet_id(),
            ),
            ControlPacket::V3(v3::Packet::PublishReceived(ack)) => {
                Self::handle_pub_rec(ctx, ack.packet_id())
            }
            ControlPacket::V5(v5::Packet::PublishReceived(ack)) => {
                Self::handle_pub_rec(ctx, ack.packet_id())
            }
            ControlPacket::V3(v3::Packet::PublishRelease(ack)) => {
                Self::handle_pub_rel(ctx, ack.packet_id())
            }
            ControlPacket::V5(v5::Packet::PublishRelease(ack)) => {
                Self::handle_pub_rel(ctx, ack.packet_id())
            }
            ControlPacket::V3(v3::Packet::PingResponse(_))
            | ControlPacket::V5(v5::Packet::PingResponse(_)) => Self::handle_ping_resp(ctx),
            other => {
                log::warn!(
                    "ready: unexpected packet type {:?} in Ready state",
                    other.packet_type()
                );
                Self::strict_mode_violation(ctx)
            }
        }
    }

    fn on_tick(&mut self, ctx: &mut Context) -> Transition {
        let keepalive_seconds = ctx.settings().keep_alive_interval_seconds();
        if keepalive_seconds != 0 {
            let keepalive = Duration::from_secs(u64::from(keepalive_seconds));
            let since_activity = ctx.time_since_last_activity();

            if ctx.is_ping_pending() {
                // Allow the broker half a keepalive interval to answer.
                let ping_timeout = keepalive + keepalive / 2;
                if since_activity >= ping_timeout {
                    log::warn!("ready: broker unresponsive, no PINGRESP in {since_activity:?}");
                    return Transition::to(DisconnectedState::new(false));
                }
            } else if since_activity >= keepalive {
                match wire::encode_ping_request() {
                    Ok(buf) => {
                        ctx.send_packet(&buf);
                        ctx.set_ping_pending(true);
                        ctx.record_activity();
                    }
                    Err(err) => log::error!("ready: failed to encode PINGREQ: {err:?}"),
                }
            }
        }

        let timed_out: Vec<PacketId> = ctx
            .pending_publish_ids()
            .into_iter()
            .filter(|packet_id| ctx.publish_elapsed_time(*packet_id) >= PUBLISH_TIMEOUT)
            .collect();

        for packet_id in timed_out {
            if let Some(command) = ctx.take_pending_publish(packet_id) {
                log::warn!("ready: publish {packet_id} timed out");
                ctx.release_packet_id(packet_id);
                ctx.clear_publish_timeout(packet_id);
                resolve(command.promise, Err(Error::PublishTimeout));
            }
        }

        Transition::Stay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, TopicFilter};
    use crate::settings::ConnectionSettings;
    use futures::channel::oneshot;
    use std::sync::Arc;

    fn test_context() -> Context {
        Context::new(Arc::new(ConnectionSettings::default()))
    }

    #[derive(Default)]
    struct NullSocket;

    impl crate::socket::Socket for NullSocket {
        fn connect(&mut self) {}
        fn send(&mut self, _data: &[u8]) {}
        fn disconnect(&mut self) {}
        fn tick(&mut self) -> Vec<crate::socket::SocketEvent> {
            Vec::new()
        }
    }

    #[test]
    fn test_pub_ack_without_pending_is_ignored() {
        let mut ctx = test_context();
        let mut state = ReadyState::new();
        let transition = state.on_data_received(&mut ctx, &[0x40, 0x02, 0x00, 0x01]);
        assert!(matches!(transition, Transition::Stay));
    }

    #[test]
    fn test_pub_ack_resolves_pending_publish() {
        let mut ctx = test_context();
        let mut state = ReadyState::new();

        let packet_id = ctx.allocate_packet_id().unwrap();
        let (tx, mut rx) = oneshot::channel();
        ctx.store_pending_publish(
            packet_id,
            PublishCommand {
                message: Message::new("a/b", &[1], QoS::AtLeastOnce, false),
                promise: tx,
            },
        );
        ctx.record_publish_sent(packet_id);

        state.on_data_received(&mut ctx, &[0x40, 0x02, 0x00, packet_id.value() as u8]);
        assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
        assert!(!ctx.is_packet_id_in_use(packet_id));
    }

    #[test]
    fn test_suback_resolves_batch() {
        let mut ctx = test_context();
        let mut state = ReadyState::new();

        let packet_id = ctx.allocate_packet_id().unwrap();
        assert_eq!(packet_id.value(), 1);
        let (tx, mut rx) = oneshot::channel();
        ctx.store_pending_subscribes(
            packet_id,
            SubscribesCommand {
                filters: vec![
                    TopicFilter::new("a", QoS::AtLeastOnce),
                    TopicFilter::new("b", QoS::ExactOnce),
                    TopicFilter::new("c", QoS::AtMostOnce),
                ],
                promise: tx,
            },
        );

        // V5 SUBACK, packet id 1, codes granted-1, granted-2, not-authorized.
        state.on_data_received(&mut ctx, &[0x90, 0x06, 0x00, 0x01, 0x00, 0x01, 0x02, 0x87]);
        let results = rx.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(
            results.iter().map(|r| r.success).collect::<Vec<_>>(),
            vec![true, true, false]
        );
        assert!(!ctx.is_packet_id_in_use(packet_id));
    }

    #[test]
    fn test_disconnect_command_enters_closing() {
        let mut ctx = test_context();
        ctx.set_socket(Some(Box::new(NullSocket)));
        let mut state = ReadyState::new();
        let (tx, _rx) = oneshot::channel();
        let transition = state.handle_command(&mut ctx, Command::Disconnect { promise: tx });
        match transition {
            Transition::To(next) => assert_eq!(next.name(), "Closing"),
            Transition::Stay => panic!("expected transition to Closing"),
        }
    }

    #[test]
    fn test_socket_drop_is_ungraceful() {
        let mut ctx = test_context();
        let mut state = ReadyState::new();
        let transition = state.on_socket_disconnected(&mut ctx);
        match transition {
            Transition::To(next) => assert_eq!(next.name(), "Disconnected"),
            Transition::Stay => panic!("expected transition to Disconnected"),
        }
    }

    #[test]
    fn test_strict_mode_rejects_unexpected_packet() {
        let mut settings = ConnectionSettings::default();
        settings.set_strict_mode(true);
        let mut ctx = Context::new(Arc::new(settings));
        let mut state = ReadyState::new();

        // A CONNACK is unexpected once the session is up.
        let transition = state.on_data_received(&mut ctx, &[0x20, 0x03, 0x00, 0x00, 0x00]);
        assert!(matches!(transition, Transition::To(_)));
    }

    #[test]
    fn test_lenient_mode_ignores_unexpected_packet() {
        let mut ctx = test_context();
        let mut state = ReadyState::new();
        let transition = state.on_data_received(&mut ctx, &[0x20, 0x03, 0x00, 0x00, 0x00]);
        assert!(matches!(transition, Transition::Stay));
    }
}
