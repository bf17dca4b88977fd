// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Inbound PUBLISH handling, dispatched by `QoS`.

use codec::{PacketId, QoS};

use super::Transition;
use crate::context::Context;
use crate::message::Message;
use crate::wire;

fn broadcast_message(ctx: &Context, message: Message) {
    let delegate = ctx.on_message().clone();
    ctx.invoke_callback(move || {
        delegate.broadcast(&message);
    });
}

fn handle_qos0(ctx: &mut Context, message: Message) -> Transition {
    broadcast_message(ctx, message);
    Transition::Stay
}

fn handle_qos1(ctx: &mut Context, message: Message, packet_id: PacketId) -> Transition {
    if !ctx.track_incoming_packet_id(packet_id) {
        log::warn!("incoming: duplicate QoS 1 publish packet id: {packet_id}");
        return Transition::Stay;
    }

    broadcast_message(ctx, message);

    match wire::encode_publish_ack(ctx.protocol_version(), packet_id) {
        Ok(buf) => ctx.send_packet(&buf),
        Err(err) => log::error!("incoming: failed to encode PUBACK: {err:?}"),
    }

    ctx.release_incoming_packet_id(packet_id);
    Transition::Stay
}

fn handle_qos2(ctx: &mut Context, message: Message, packet_id: PacketId) -> Transition {
    if !ctx.track_incoming_packet_id(packet_id) {
        log::warn!("incoming: duplicate QoS 2 publish packet id: {packet_id}");
        return Transition::Stay;
    }

    // Delivery is deferred until the broker releases the message.
    ctx.store_pending_incoming_qos2(packet_id, message);

    match wire::encode_publish_received(ctx.protocol_version(), packet_id) {
        Ok(buf) => ctx.send_packet(&buf),
        Err(err) => log::error!("incoming: failed to encode PUBREC: {err:?}"),
    }

    Transition::Stay
}

/// Route one inbound publish into the message delegates and the `QoS`
/// acknowledgment flow.
pub fn handle(
    ctx: &mut Context,
    topic: &str,
    payload: &[u8],
    qos: QoS,
    retain: bool,
    packet_id: PacketId,
) -> Transition {
    let message = Message::new(topic, payload, qos, retain);
    match qos {
        QoS::AtMostOnce => handle_qos0(ctx, message),
        QoS::AtLeastOnce => handle_qos1(ctx, message, packet_id),
        QoS::ExactOnce => handle_qos2(ctx, message, packet_id),
    }
}
