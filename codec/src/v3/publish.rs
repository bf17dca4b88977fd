// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;
use std::io::Write;

use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, QoS, StringData, VarIntError,
};

/// `PublishPacket` is used to transport application messages from the client
/// to the broker, or from the broker to the client.
///
/// Basic structure of packet:
///
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// |                       |
/// +-----------------------+
/// | Topic name length     |
/// |                       |
/// +-----------------------+
/// | Topic name ...        |
/// +-----------------------+
/// | Packet Identifier     |
/// |                       |
/// +-----------------------+
/// | Msg payload ...       |
/// +-----------------------+
/// ```
///
/// Note that `packet_id` only appears in `QoS` 1 and `QoS` 2 packets.
/// The payload spans the remainder of the remaining length.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    /// Set on re-delivery of a `QoS` > 0 message. MUST be 0 for all
    /// `QoS` 0 messages [MQTT-3.3.1-2].
    dup: bool,

    qos: QoS,

    /// Whether the broker stores this message for future subscribers.
    retain: bool,

    topic: StringData,

    packet_id: PacketId,

    payload: Bytes,
}

impl PublishPacket {
    /// Create a new publish packet.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is too long.
    pub fn new(topic: &str, qos: QoS, payload: &[u8]) -> Result<Self, EncodeError> {
        Ok(Self {
            qos,
            topic: StringData::from(topic)?,
            payload: Bytes::copy_from_slice(payload),
            ..Self::default()
        })
    }

    pub fn set_dup(&mut self, dup: bool) -> &mut Self {
        self.dup = dup;
        self
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn remaining_length(&self) -> usize {
        let mut len = self.topic.bytes() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            len += PacketId::bytes();
        }
        len
    }

    fn header_type(&self) -> PacketType {
        PacketType::Publish {
            dup: self.dup,
            qos: self.qos,
            retain: self.retain,
        }
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = FixedHeader::new(self.header_type(), self.remaining_length())?;
        fixed_header.encode(buf)?;

        self.topic.encode(buf)?;
        if self.qos != QoS::AtMostOnce {
            self.packet_id.encode(buf)?;
        }
        buf.write_all(&self.payload)?;

        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for PublishPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let (dup, qos, retain) = match fixed_header.packet_type() {
            PacketType::Publish { dup, qos, retain } => (dup, qos, retain),
            _ => return Err(DecodeError::InvalidPacketType),
        };

        let variable_start = ba.offset();
        let topic = StringData::decode(ba)?;
        let packet_id = if qos == QoS::AtMostOnce {
            PacketId::default()
        } else {
            PacketId::decode(ba)?
        };

        // Payload spans the rest of the remaining length; a header count
        // smaller than the variable header is malformed.
        let consumed = ba.offset() - variable_start;
        let payload_len = fixed_header
            .remaining_length()
            .checked_sub(consumed)
            .ok_or(DecodeError::InvalidRemainingLength)?;
        let payload = Bytes::copy_from_slice(ba.read_bytes(payload_len)?);

        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        })
    }
}

impl Packet for PublishPacket {
    fn packet_type(&self) -> PacketType {
        self.header_type()
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(self.header_type(), self.remaining_length())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_qos1() {
        let mut packet = PublishPacket::new("a/b", QoS::AtLeastOnce, &[0x01]).unwrap();
        packet.set_packet_id(PacketId::new(1));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x32, 0x08, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x01, 0x01]);
    }

    #[test]
    fn test_decode_qos0() {
        let buf = [0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', 0xde, 0xad];
        let mut ba = ByteArray::new(&buf);
        let packet = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(packet.topic(), "a/b");
        assert_eq!(packet.qos(), QoS::AtMostOnce);
        assert_eq!(packet.payload(), &[0xde, 0xad]);
    }

    #[test]
    fn test_decode_qos2() {
        let buf = [0x34, 0x0a, 0x00, 0x03, b'x', b'/', b'y', 0x00, 0x05, 0xaa, 0xbb, 0xcc];
        let mut ba = ByteArray::new(&buf);
        let packet = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(packet.qos(), QoS::ExactOnce);
        assert_eq!(packet.packet_id(), PacketId::new(5));
        assert_eq!(packet.payload(), &[0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn test_reject_short_remaining_length() {
        // Remaining length 3 cannot even hold the topic.
        let buf = [0x32, 0x03, 0x00, 0x03, b'a'];
        let mut ba = ByteArray::new(&buf);
        assert!(PublishPacket::decode(&mut ba).is_err());
    }

    #[test]
    fn test_round_trip_retain() {
        let mut packet = PublishPacket::new("t", QoS::AtMostOnce, b"x").unwrap();
        packet.set_retain(true);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(PublishPacket::decode(&mut ba).unwrap(), packet);
    }
}
