// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Version-dispatched packet construction for the outbound path, plus the
//! version-tagged inbound packet wrapper.

use codec::v5::{Property, ReasonCode};
use codec::{
    v3, v5, BinaryData, EncodeError, EncodePacket, PacketId, PacketType, PingRequestPacket,
    ProtocolVersion, QoS, StringData,
};

use crate::message::{Message, TopicFilter};

/// An inbound control packet tagged with the protocol version it was
/// parsed under.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlPacket {
    V3(v3::Packet),
    V5(v5::Packet),
}

impl ControlPacket {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::V3(p) => p.packet_type(),
            Self::V5(p) => p.packet_type(),
        }
    }

    #[must_use]
    pub fn packet_id(&self) -> Option<PacketId> {
        match self {
            Self::V3(p) => p.packet_id(),
            Self::V5(p) => p.packet_id(),
        }
    }
}

/// Everything a CONNECT packet needs beyond the settings object.
pub struct ConnectParams<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub username: &'a str,
    pub password: &'a str,
    pub auth_method: &'a str,
    pub initial_auth_data: &'a [u8],
    pub will: Option<&'a Message>,
}

/// Encode a CONNECT packet for `version`.
///
/// # Errors
///
/// Returns error if a field exceeds its wire limits.
pub fn encode_connect(
    version: ProtocolVersion,
    params: &ConnectParams<'_>,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => {
            let mut packet = v3::ConnectPacket::new(params.client_id)?;
            packet.set_clean_session(params.clean_session);
            packet.set_keep_alive(params.keep_alive);
            if !params.username.is_empty() {
                packet.set_username(params.username)?;
            }
            if !params.password.is_empty() {
                packet.set_password(params.password.as_bytes())?;
            }
            if let Some(will) = params.will {
                packet.set_will(will.topic(), will.payload())?;
                packet.set_will_qos(will.qos());
                packet.set_will_retain(will.retain());
            }
            packet.encode(&mut buf)?;
        }
        ProtocolVersion::V5 => {
            let mut packet = v5::ConnectPacket::new(params.client_id)?;
            packet.set_clean_session(params.clean_session);
            packet.set_keep_alive(params.keep_alive);
            if !params.username.is_empty() {
                packet.set_username(params.username)?;
            }
            if !params.password.is_empty() {
                packet.set_password(params.password.as_bytes())?;
            }
            if !params.auth_method.is_empty() {
                packet
                    .mut_properties()
                    .push(Property::AuthenticationMethod(StringData::from(
                        params.auth_method,
                    )?));
                if !params.initial_auth_data.is_empty() {
                    packet
                        .mut_properties()
                        .push(Property::AuthenticationData(BinaryData::from_slice(
                            params.initial_auth_data,
                        )?));
                }
            }
            if let Some(will) = params.will {
                packet.set_will(will.topic(), will.payload())?;
                packet.set_will_qos(will.qos());
                packet.set_will_retain(will.retain());
            }
            packet.encode(&mut buf)?;
        }
    }
    Ok(buf)
}

/// Encode a PUBLISH packet for `version`. `packet_id` is ignored for
/// `QoS` 0 messages.
///
/// # Errors
///
/// Returns error if the topic exceeds its wire limits.
pub fn encode_publish(
    version: ProtocolVersion,
    message: &Message,
    packet_id: PacketId,
    dup: bool,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => {
            let mut packet = v3::PublishPacket::new(message.topic(), message.qos(), message.payload())?;
            packet.set_retain(message.retain());
            if message.qos() != QoS::AtMostOnce {
                packet.set_packet_id(packet_id);
                packet.set_dup(dup);
            }
            packet.encode(&mut buf)?;
        }
        ProtocolVersion::V5 => {
            let mut packet = v5::PublishPacket::new(message.topic(), message.qos(), message.payload())?;
            packet.set_retain(message.retain());
            if message.qos() != QoS::AtMostOnce {
                packet.set_packet_id(packet_id);
                packet.set_dup(dup);
            }
            packet.encode(&mut buf)?;
        }
    }
    Ok(buf)
}

/// Encode a PUBACK packet for `version`.
///
/// # Errors
///
/// Returns error if encoding fails.
pub fn encode_publish_ack(
    version: ProtocolVersion,
    packet_id: PacketId,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => v3::PublishAckPacket::new(packet_id).encode(&mut buf)?,
        ProtocolVersion::V5 => v5::PublishAckPacket::new(packet_id).encode(&mut buf)?,
    };
    Ok(buf)
}

/// Encode a PUBREC packet for `version`.
///
/// # Errors
///
/// Returns error if encoding fails.
pub fn encode_publish_received(
    version: ProtocolVersion,
    packet_id: PacketId,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => v3::PublishReceivedPacket::new(packet_id).encode(&mut buf)?,
        ProtocolVersion::V5 => v5::PublishReceivedPacket::new(packet_id).encode(&mut buf)?,
    };
    Ok(buf)
}

/// Encode a PUBREL packet for `version`.
///
/// # Errors
///
/// Returns error if encoding fails.
pub fn encode_publish_release(
    version: ProtocolVersion,
    packet_id: PacketId,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => v3::PublishReleasePacket::new(packet_id).encode(&mut buf)?,
        ProtocolVersion::V5 => v5::PublishReleasePacket::new(packet_id).encode(&mut buf)?,
    };
    Ok(buf)
}

/// Encode a PUBCOMP packet for `version`.
///
/// # Errors
///
/// Returns error if encoding fails.
pub fn encode_publish_complete(
    version: ProtocolVersion,
    packet_id: PacketId,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => v3::PublishCompletePacket::new(packet_id).encode(&mut buf)?,
        ProtocolVersion::V5 => v5::PublishCompletePacket::new(packet_id).encode(&mut buf)?,
    };
    Ok(buf)
}

/// Encode a SUBSCRIBE packet for `version`.
///
/// # Errors
///
/// Returns error if `filters` is empty or a filter is too long.
pub fn encode_subscribe(
    version: ProtocolVersion,
    filters: &[TopicFilter],
    packet_id: PacketId,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => {
            let topics = filters
                .iter()
                .map(|f| v3::SubscribeTopic::new(f.filter(), f.qos()))
                .collect::<Result<Vec<_>, EncodeError>>()?;
            v3::SubscribePacket::with_topics(packet_id, topics)?.encode(&mut buf)?;
        }
        ProtocolVersion::V5 => {
            let topics = filters
                .iter()
                .map(|f| v5::SubscribeTopic::new(f.filter(), f.qos()))
                .collect::<Result<Vec<_>, EncodeError>>()?;
            v5::SubscribePacket::with_topics(packet_id, topics)?.encode(&mut buf)?;
        }
    }
    Ok(buf)
}

/// Encode an UNSUBSCRIBE packet for `version`.
///
/// # Errors
///
/// Returns error if `topics` is empty or a topic is too long.
pub fn encode_unsubscribe(
    version: ProtocolVersion,
    topics: &[String],
    packet_id: PacketId,
) -> Result<Vec<u8>, EncodeError> {
    let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => {
            v3::UnsubscribePacket::new(packet_id, &topic_refs)?.encode(&mut buf)?;
        }
        ProtocolVersion::V5 => {
            v5::UnsubscribePacket::new(packet_id, &topic_refs)?.encode(&mut buf)?;
        }
    }
    Ok(buf)
}

/// Encode a DISCONNECT packet for `version` reporting normal closure.
///
/// # Errors
///
/// Returns error if encoding fails.
pub fn encode_disconnect(version: ProtocolVersion) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match version {
        ProtocolVersion::V311 => v3::DisconnectPacket::new().encode(&mut buf)?,
        ProtocolVersion::V5 => v5::DisconnectPacket::new().encode(&mut buf)?,
    };
    Ok(buf)
}

/// Encode an AUTH packet continuing the enhanced auth exchange with
/// `auth_data` from the credentials provider (MQTT 5.0 only).
///
/// # Errors
///
/// Returns error if `auth_data` exceeds its wire limits.
pub fn encode_auth_continue(auth_data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut packet = v5::AuthPacket::new(ReasonCode::ContinueAuthentication);
    if !auth_data.is_empty() {
        packet
            .mut_properties()
            .push(Property::AuthenticationData(BinaryData::from_slice(
                auth_data,
            )?));
    }
    let mut buf = Vec::new();
    packet.encode(&mut buf)?;
    Ok(buf)
}

/// Encode a PINGREQ packet.
///
/// # Errors
///
/// Returns error if encoding fails.
pub fn encode_ping_request() -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    PingRequestPacket::new().encode(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_v5_prefix() {
        let params = ConnectParams {
            client_id: "c1",
            keep_alive: 60,
            clean_session: true,
            username: "",
            password: "",
            auth_method: "",
            initial_auth_data: &[],
            will: None,
        };
        let buf = encode_connect(ProtocolVersion::V5, &params).unwrap();
        assert_eq!(
            &buf[..13],
            &[0x10, 0x0f, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x02, 0x00, 0x3c, 0x00]
        );
    }

    #[test]
    fn test_publish_qos1_v311() {
        let message = Message::new("a/b", &[0x01], QoS::AtLeastOnce, false);
        let buf =
            encode_publish(ProtocolVersion::V311, &message, PacketId::new(1), false).unwrap();
        assert_eq!(
            &buf,
            &[0x32, 0x08, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x01, 0x01]
        );
    }

    #[test]
    fn test_publish_retransmission_sets_dup() {
        let message = Message::new("a", &[], QoS::AtLeastOnce, false);
        let buf = encode_publish(ProtocolVersion::V311, &message, PacketId::new(2), true).unwrap();
        assert_eq!(buf[0], 0x3a);
    }

    #[test]
    fn test_ack_helpers_match_versions() {
        let v3_ack = encode_publish_ack(ProtocolVersion::V311, PacketId::new(1)).unwrap();
        let v5_ack = encode_publish_ack(ProtocolVersion::V5, PacketId::new(1)).unwrap();
        // Both collapse to the 4-byte wire form.
        assert_eq!(v3_ack, v5_ack);
        assert_eq!(&v3_ack, &[0x40, 0x02, 0x00, 0x01]);
    }
}
