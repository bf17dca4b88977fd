// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    BinaryData, ByteArray, ConnectFlags, DecodeError, DecodePacket, EncodeError, EncodePacket,
    FixedHeader, Packet, PacketType, ProtocolVersion, QoS, StringData, U16Data, VarIntError,
};

pub const PROTOCOL_NAME: &str = "MQTT";

/// `ConnectPacket` is the first packet sent to the broker after a network
/// connection is established.
///
/// Basic structure of packet:
/// ```txt
///  7                          0
/// +----------------------------+
/// | Fixed header               |
/// |                            |
/// +----------------------------+
/// | Protocol name length       |
/// |                            |
/// +----------------------------+
/// | Protocol name              |
/// |                            |
/// +----------------------------+
/// | Protocol level             |
/// +----------------------------+
/// | Connect flags              |
/// +----------------------------+
/// | Keep alive                 |
/// |                            |
/// +----------------------------+
/// | Client id length           |
/// |                            |
/// +----------------------------+
/// | Client id ...              |
/// +----------------------------+
/// | Will topic length          |
/// |                            |
/// +----------------------------+
/// | Will topic ...             |
/// +----------------------------+
/// | Will message length        |
/// |                            |
/// +----------------------------+
/// | Will message ...           |
/// +----------------------------+
/// | Username length            |
/// |                            |
/// +----------------------------+
/// | Username ...               |
/// +----------------------------+
/// | Password length            |
/// |                            |
/// +----------------------------+
/// | Password ...               |
/// +----------------------------+
/// ```
///
/// A zero length client id together with `clean_session` requests a
/// broker-assigned identifier.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    clean_session: bool,

    /// Time interval between two packets in seconds.
    /// Client must send PingRequest packets before keep alive timeout.
    keep_alive: U16Data,

    client_id: StringData,

    will_topic: Option<StringData>,
    will_message: Option<BinaryData>,
    will_qos: QoS,
    will_retain: bool,

    username: Option<StringData>,
    password: Option<BinaryData>,
}

impl ConnectPacket {
    /// Create a connect packet with `client_id` and clean session set.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is too long.
    pub fn new(client_id: &str) -> Result<Self, EncodeError> {
        Ok(Self {
            clean_session: true,
            keep_alive: U16Data::new(60),
            client_id: StringData::from(client_id)?,
            ..Self::default()
        })
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = U16Data::new(keep_alive);
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive.value()
    }

    /// Update client id.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is too long.
    pub fn set_client_id(&mut self, client_id: &str) -> Result<&mut Self, EncodeError> {
        self.client_id = StringData::from(client_id)?;
        Ok(self)
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_ref()
    }

    /// Set will topic and payload.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` or `message` is too long.
    pub fn set_will(&mut self, topic: &str, message: &[u8]) -> Result<&mut Self, EncodeError> {
        self.will_topic = Some(StringData::from(topic)?);
        self.will_message = Some(BinaryData::from_slice(message)?);
        Ok(self)
    }

    #[must_use]
    pub fn will_topic(&self) -> Option<&str> {
        self.will_topic.as_ref().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn will_message(&self) -> Option<&[u8]> {
        self.will_message.as_ref().map(AsRef::as_ref)
    }

    pub fn set_will_qos(&mut self, qos: QoS) -> &mut Self {
        self.will_qos = qos;
        self
    }

    #[must_use]
    pub const fn will_qos(&self) -> QoS {
        self.will_qos
    }

    pub fn set_will_retain(&mut self, retain: bool) -> &mut Self {
        self.will_retain = retain;
        self
    }

    #[must_use]
    pub const fn will_retain(&self) -> bool {
        self.will_retain
    }

    /// Update username.
    ///
    /// # Errors
    ///
    /// Returns error if `username` is too long.
    pub fn set_username(&mut self, username: &str) -> Result<&mut Self, EncodeError> {
        self.username = if username.is_empty() {
            None
        } else {
            Some(StringData::from(username)?)
        };
        Ok(self)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_ref().map(AsRef::as_ref)
    }

    /// Update password.
    ///
    /// # Errors
    ///
    /// Returns error if `password` is too long.
    pub fn set_password(&mut self, password: &[u8]) -> Result<&mut Self, EncodeError> {
        self.password = if password.is_empty() {
            None
        } else {
            Some(BinaryData::from_slice(password)?)
        };
        Ok(self)
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_ref().map(AsRef::as_ref)
    }

    fn connect_flags(&self) -> ConnectFlags {
        ConnectFlags {
            username: self.username.is_some(),
            password: self.password.is_some(),
            will_retain: self.will_retain,
            will_qos: self.will_qos,
            will: self.will_topic.is_some(),
            clean_session: self.clean_session,
        }
    }

    fn remaining_length(&self) -> usize {
        let mut len = 2 + PROTOCOL_NAME.len()
            + ProtocolVersion::bytes()
            + ConnectFlags::bytes()
            + U16Data::bytes()
            + self.client_id.bytes();
        if let Some(will_topic) = &self.will_topic {
            len += will_topic.bytes();
        }
        if let Some(will_message) = &self.will_message {
            len += will_message.bytes();
        }
        if let Some(username) = &self.username {
            len += username.bytes();
        }
        if let Some(password) = &self.password {
            len += password.bytes();
        }
        len
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = FixedHeader::new(PacketType::Connect, self.remaining_length())?;
        fixed_header.encode(buf)?;

        StringData::from(PROTOCOL_NAME)?.encode(buf)?;
        ProtocolVersion::V311.encode(buf)?;
        self.connect_flags().encode(buf)?;
        self.keep_alive.encode(buf)?;

        self.client_id.encode(buf)?;
        if let Some(will_topic) = &self.will_topic {
            will_topic.encode(buf)?;
        }
        if let Some(will_message) = &self.will_message {
            will_message.encode(buf)?;
        }
        if let Some(username) = &self.username {
            username.encode(buf)?;
        }
        if let Some(password) = &self.password {
            password.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = StringData::decode(ba)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }
        let version = ProtocolVersion::decode(ba)?;
        if version != ProtocolVersion::V311 {
            return Err(DecodeError::InvalidProtocolVersion);
        }

        let flags = ConnectFlags::decode(ba)?;
        let keep_alive = U16Data::decode(ba)?;
        let client_id = StringData::decode(ba)?;

        let will_topic = if flags.will {
            Some(StringData::decode(ba)?)
        } else {
            None
        };
        let will_message = if flags.will {
            Some(BinaryData::decode(ba)?)
        } else {
            None
        };
        let username = if flags.username {
            Some(StringData::decode(ba)?)
        } else {
            None
        };
        let password = if flags.password {
            Some(BinaryData::decode(ba)?)
        } else {
            None
        };

        Ok(Self {
            clean_session: flags.clean_session,
            keep_alive,
            client_id,
            will_topic,
            will_message,
            will_qos: flags.will_qos,
            will_retain: flags.will_retain,
            username,
            password,
        })
    }
}

impl Packet for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(PacketType::Connect, self.remaining_length())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let mut packet = ConnectPacket::new("c1").unwrap();
        packet.set_keep_alive(60);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(
            &buf,
            &[
                0x10, 0x0e, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3c, 0x00,
                0x02, b'c', b'1',
            ]
        );
    }

    #[test]
    fn test_round_trip_with_credentials() {
        let mut packet = ConnectPacket::new("client-7").unwrap();
        packet.set_username("user").unwrap();
        packet.set_password(b"secret").unwrap();
        packet.set_clean_session(false);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_round_trip_with_will() {
        let mut packet = ConnectPacket::new("c2").unwrap();
        packet.set_will("status/c2", b"gone").unwrap();
        packet.set_will_qos(QoS::AtLeastOnce);
        packet.set_will_retain(true);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_empty_client_id_is_valid() {
        let packet = ConnectPacket::new("").unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert!(decoded.client_id().is_empty());
        assert!(decoded.clean_session());
    }

    #[test]
    fn test_reject_wrong_protocol_name() {
        let buf = [
            0x10, 0x0e, 0x00, 0x04, b'M', b'Q', b'T', b'X', 0x04, 0x02, 0x00, 0x3c, 0x00, 0x02,
            b'c', b'1',
        ];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba),
            Err(DecodeError::InvalidProtocolName)
        );
    }
}
