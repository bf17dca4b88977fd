// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    BinaryData, ByteArray, ConnectFlags, DecodeError, DecodePacket, EncodeError, EncodePacket,
    FixedHeader, Packet, PacketType, ProtocolVersion, QoS, StringData, U16Data, VarIntError,
};

use super::property::check_property_type_list;
use super::{Properties, PropertyType};

pub const PROTOCOL_NAME: &str = "MQTT";

/// Properties available in connect packets.
pub const CONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReceiveMaximum,
    PropertyType::MaximumPacketSize,
    PropertyType::TopicAliasMaximum,
    PropertyType::RequestResponseInformation,
    PropertyType::RequestProblemInformation,
    PropertyType::UserProperty,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
];

/// Properties available in the will table of connect packets.
pub const CONNECT_WILL_PROPERTIES: &[PropertyType] = &[
    PropertyType::WillDelayInterval,
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::ContentType,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
];

/// `ConnectPacket` is the first packet sent to the broker after a network
/// connection is established.
///
/// The MQTT 5.0 variable header extends the 3.1.1 form with a property
/// table, and the payload gains a will property table in front of the will
/// topic:
///
/// ```txt
/// | Fixed header | "MQTT" | level 5 | connect flags | keep alive |
/// | Properties | Client id | Will props | Will topic | Will payload |
/// | Username | Password |
/// ```
///
/// A zero length client id together with `clean_session` requests a
/// broker-assigned identifier, returned in the CONNACK.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    clean_session: bool,

    keep_alive: U16Data,

    properties: Properties,

    client_id: StringData,

    will_properties: Properties,
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

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn will_properties(&self) -> &Properties {
        &self.will_properties
    }

    pub fn mut_will_properties(&mut self) -> &mut Properties {
        &mut self.will_properties
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
            + self.properties.bytes()
            + self.client_id.bytes();
        if let Some(will_topic) = &self.will_topic {
            len += self.will_properties.bytes();
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
        ProtocolVersion::V5.encode(buf)?;
        self.connect_flags().encode(buf)?;
        self.keep_alive.encode(buf)?;
        self.properties.encode(buf)?;

        self.client_id.encode(buf)?;
        if let Some(will_topic) = &self.will_topic {
            self.will_properties.encode(buf)?;
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
        if version != ProtocolVersion::V5 {
            return Err(DecodeError::InvalidProtocolVersion);
        }

        let flags = ConnectFlags::decode(ba)?;
        let keep_alive = U16Data::decode(ba)?;

        let properties = Properties::decode(ba)?;
        if let Err(property_type) = check_property_type_list(properties.props(), CONNECT_PROPERTIES)
        {
            log::error!("v5/ConnectPacket: property type {property_type:?} cannot be used in properties!");
            return Err(DecodeError::InvalidPropertyType);
        }

        let client_id = StringData::decode(ba)?;

        let (will_properties, will_topic) = if flags.will {
            let will_properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(will_properties.props(), CONNECT_WILL_PROPERTIES)
            {
                log::error!(
                    "v5/ConnectPacket: property type {property_type:?} cannot be used in will properties!"
                );
                return Err(DecodeError::InvalidPropertyType);
            }
            (will_properties, Some(StringData::decode(ba)?))
        } else {
            (Properties::new(), None)
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
            properties,
            client_id,
            will_properties,
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
    use crate::v5::Property;
    use crate::StringData;

    #[test]
    fn test_encode() {
        let mut packet = ConnectPacket::new("c1").unwrap();
        packet.set_keep_alive(60);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(
            &buf,
            &[
                0x10, 0x0f, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x02, 0x00, 0x3c, 0x00,
                0x00, 0x02, b'c', b'1',
            ]
        );
    }

    #[test]
    fn test_round_trip_with_auth_properties() {
        let mut packet = ConnectPacket::new("device-9").unwrap();
        packet
            .mut_properties()
            .push(Property::AuthenticationMethod(
                StringData::from("SCRAM-SHA-1").unwrap(),
            ));
        packet.set_username("user").unwrap();
        packet.set_password(b"pass").unwrap();

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_round_trip_with_will() {
        let mut packet = ConnectPacket::new("c3").unwrap();
        packet.set_will("state/c3", b"offline").unwrap();
        packet.set_will_qos(QoS::ExactOnce);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectPacket::decode(&mut ba).unwrap(), packet);
    }
}
