// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use reactormq_codec::{v3, v5, ByteArray, DecodePacket, EncodePacket, PacketId, QoS};

fn main() {
    let mut packet = v3::PublishPacket::new("sensors/kitchen/temp", QoS::AtLeastOnce, b"21.5")
        .unwrap();
    packet.set_packet_id(PacketId::new(17));

    let mut buf = Vec::new();
    packet.encode(&mut buf).unwrap();
    println!("v3 wire form: {buf:02x?}");

    let mut ba = ByteArray::new(&buf);
    let decoded = v3::PublishPacket::decode(&mut ba).unwrap();
    println!(
        "decoded topic={:?} qos={:?} payload={:?}",
        decoded.topic(),
        decoded.qos(),
        decoded.payload()
    );

    // The same conversation at protocol level 5 carries a property table.
    let buf = [0x20, 0x03, 0x00, 0x00, 0x00];
    let mut ba = ByteArray::new(&buf);
    let conn_ack = v5::ConnectAckPacket::decode(&mut ba).unwrap();
    println!(
        "v5 connect ack: session_present={} reason={:?}",
        conn_ack.session_present(),
        conn_ack.reason_code()
    );
}
