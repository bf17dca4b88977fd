// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{ByteArray, DecodeError, DecodePacket, PacketId, PacketType};

use super::{
    ConnectAckPacket, ConnectPacket, DisconnectPacket, PublishAckPacket, PublishCompletePacket,
    PublishPacket, PublishReceivedPacket, PublishReleasePacket, SubscribeAckPacket,
    SubscribePacket, UnsubscribeAckPacket, UnsubscribePacket,
};
use crate::{PingRequestPacket, PingResponsePacket};

/// Any MQTT 3.1.1 control packet, dispatched by the fixed header.
///
/// Note that the Auth packet does not exist at this protocol level;
/// its type nibble decodes as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnectAck(_) => PacketType::ConnectAck,
            Self::Publish(p) => PacketType::Publish {
                dup: p.dup(),
                qos: p.qos(),
                retain: p.retain(),
            },
            Self::PublishAck(_) => PacketType::PublishAck,
            Self::PublishReceived(_) => PacketType::PublishReceived,
            Self::PublishRelease(_) => PacketType::PublishRelease,
            Self::PublishComplete(_) => PacketType::PublishComplete,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubscribeAck(_) => PacketType::SubscribeAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubscribeAck(_) => PacketType::UnsubscribeAck,
            Self::PingRequest(_) => PacketType::PingRequest,
            Self::PingResponse(_) => PacketType::PingResponse,
            Self::Disconnect(_) => PacketType::Disconnect,
        }
    }

    /// Get the packet id for packet types that carry one.
    #[must_use]
    pub fn packet_id(&self) -> Option<PacketId> {
        match self {
            Self::Publish(p) => {
                if p.qos() == crate::QoS::AtMostOnce {
                    None
                } else {
                    Some(p.packet_id())
                }
            }
            Self::PublishAck(p) => Some(p.packet_id()),
            Self::PublishReceived(p) => Some(p.packet_id()),
            Self::PublishRelease(p) => Some(p.packet_id()),
            Self::PublishComplete(p) => Some(p.packet_id()),
            Self::Subscribe(p) => Some(p.packet_id()),
            Self::SubscribeAck(p) => Some(p.packet_id()),
            Self::Unsubscribe(p) => Some(p.packet_id()),
            Self::UnsubscribeAck(p) => Some(p.packet_id()),
            _ => None,
        }
    }
}

impl DecodePacket for Packet {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        use std::convert::TryFrom;

        let packet_type = PacketType::try_from(ba.peek_byte()?)?;
        match packet_type {
            PacketType::Connect => Ok(Self::Connect(ConnectPacket::decode(ba)?)),
            PacketType::ConnectAck => Ok(Self::ConnectAck(ConnectAckPacket::decode(ba)?)),
            PacketType::Publish { .. } => Ok(Self::Publish(PublishPacket::decode(ba)?)),
            PacketType::PublishAck => Ok(Self::PublishAck(PublishAckPacket::decode(ba)?)),
            PacketType::PublishReceived => {
                Ok(Self::PublishReceived(PublishReceivedPacket::decode(ba)?))
            }
            PacketType::PublishRelease => {
                Ok(Self::PublishRelease(PublishReleasePacket::decode(ba)?))
            }
            PacketType::PublishComplete => {
                Ok(Self::PublishComplete(PublishCompletePacket::decode(ba)?))
            }
            PacketType::Subscribe => Ok(Self::Subscribe(SubscribePacket::decode(ba)?)),
            PacketType::SubscribeAck => Ok(Self::SubscribeAck(SubscribeAckPacket::decode(ba)?)),
            PacketType::Unsubscribe => Ok(Self::Unsubscribe(UnsubscribePacket::decode(ba)?)),
            PacketType::UnsubscribeAck => {
                Ok(Self::UnsubscribeAck(UnsubscribeAckPacket::decode(ba)?))
            }
            PacketType::PingRequest => Ok(Self::PingRequest(PingRequestPacket::decode(ba)?)),
            PacketType::PingResponse => Ok(Self::PingResponse(PingResponsePacket::decode(ba)?)),
            PacketType::Disconnect => Ok(Self::Disconnect(DisconnectPacket::decode(ba)?)),
            PacketType::Auth => {
                log::error!("v3: Auth packet not supported in MQTT 3.1.1");
                Err(DecodeError::InvalidPacketType)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QoS;

    #[test]
    fn test_dispatch_publish() {
        let buf = [0x30, 0x04, 0x00, 0x01, b't', 0xff];
        let mut ba = ByteArray::new(&buf);
        let packet = Packet::decode(&mut ba).unwrap();
        match packet {
            Packet::Publish(p) => {
                assert_eq!(p.topic(), "t");
                assert_eq!(p.qos(), QoS::AtMostOnce);
            }
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_rejects_auth() {
        let buf = [0xf0, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(Packet::decode(&mut ba), Err(DecodeError::InvalidPacketType));
    }
}
