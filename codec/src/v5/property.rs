// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{
    BinaryData, BoolData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, QoS,
    StringData, StringPairData, U16Data, U32Data, VarInt,
};

/// Property types that may legally occur more than once in one property table.
pub const MULTIPLE_PROPERTIES: &[PropertyType] = &[
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
];

/// A subscribe packet may carry at most one subscription identifier.
///
/// # Errors
///
/// Returns the offending property type.
pub fn check_multiple_subscription_identifiers(
    properties: &[Property],
) -> Result<(), PropertyType> {
    let count = properties
        .iter()
        .filter(|p| p.property_type() == PropertyType::SubscriptionIdentifier)
        .count();
    if count > 1 {
        return Err(PropertyType::SubscriptionIdentifier);
    }
    Ok(())
}

/// Verify all properties are listed in `types`, and that no property other
/// than the repeatable ones occurs twice.
///
/// # Errors
///
/// Returns the offending property type.
pub fn check_property_type_list(
    properties: &[Property],
    types: &[PropertyType],
) -> Result<(), PropertyType> {
    if properties.is_empty() {
        return Ok(());
    }

    for property in properties {
        if !types.contains(&property.property_type()) {
            return Err(property.property_type());
        }
    }

    for property_type in types {
        let count = properties
            .iter()
            .filter(|p| p.property_type() == *property_type)
            .count();
        if count > 1 && !MULTIPLE_PROPERTIES.contains(property_type) {
            return Err(*property_type);
        }
    }

    Ok(())
}

/// Property identifier byte.
#[allow(clippy::module_name_repetitions)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl PropertyType {
    /// Get byte length used in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// A property in a MQTT 5.0 property table.
///
/// Each identifier is followed by a value of one of seven shapes: byte,
/// two byte integer, four byte integer, variable byte integer, UTF-8
/// string, binary data, or a UTF-8 string pair. `UserProperty` may occur
/// multiple times; all other properties at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// Byte. Used in PUBLISH, Will properties.
    PayloadFormatIndicator(BoolData),

    /// Four byte integer. Used in PUBLISH, Will properties.
    MessageExpiryInterval(U32Data),

    /// UTF-8 string. Used in PUBLISH, Will properties.
    ContentType(StringData),

    /// UTF-8 string. Used in PUBLISH, Will properties.
    ResponseTopic(StringData),

    /// Binary data. Used in PUBLISH, Will properties.
    CorrelationData(BinaryData),

    /// Variable byte integer in 1..=268,435,455. Used in PUBLISH, SUBSCRIBE.
    SubscriptionIdentifier(VarInt),

    /// Four byte integer. Used in CONNECT, CONNACK, DISCONNECT.
    SessionExpiryInterval(U32Data),

    /// UTF-8 string. Used in CONNACK when the client sent a zero length
    /// client identifier.
    AssignedClientIdentifier(StringData),

    /// Two byte integer. Used in CONNACK; overrides the keepalive the
    /// client requested [MQTT-3.2.2-21].
    ServerKeepAlive(U16Data),

    /// UTF-8 string. Used in CONNECT, CONNACK, AUTH.
    AuthenticationMethod(StringData),

    /// Binary data. Used in CONNECT, CONNACK, AUTH. The content is defined
    /// by the authentication method.
    AuthenticationData(BinaryData),

    /// Byte, 0 or 1. Used in CONNECT.
    RequestProblemInformation(BoolData),

    /// Four byte integer. Will properties.
    WillDelayInterval(U32Data),

    /// Byte, 0 or 1. Used in CONNECT.
    RequestResponseInformation(BoolData),

    /// UTF-8 string. Used in CONNACK.
    ResponseInformation(StringData),

    /// UTF-8 string. Used in CONNACK, DISCONNECT.
    ServerReference(StringData),

    /// UTF-8 string. Used in all acknowledgement packets for diagnostics;
    /// not parsed by the client.
    ReasonString(StringData),

    /// Two byte integer. Used in CONNECT, CONNACK.
    ReceiveMaximum(U16Data),

    /// Two byte integer. Used in CONNECT, CONNACK.
    TopicAliasMaximum(U16Data),

    /// Two byte integer. Used in PUBLISH.
    TopicAlias(U16Data),

    /// Byte, 0 or 1. Used in CONNACK.
    MaximumQoS(QoS),

    /// Byte, 0 or 1. Used in CONNACK.
    RetainAvailable(BoolData),

    /// UTF-8 string pair. Usable in all packets; may appear multiple times.
    UserProperty(StringPairData),

    /// Four byte integer. Used in CONNECT, CONNACK.
    MaximumPacketSize(U32Data),

    /// Byte, 0 or 1. Used in CONNACK.
    WildcardSubscriptionAvailable(BoolData),

    /// Byte, 0 or 1. Used in CONNACK.
    SubscriptionIdentifierAvailable(BoolData),

    /// Byte, 0 or 1. Used in CONNACK.
    SharedSubscriptionAvailable(BoolData),
}

impl Property {
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    /// Get byte length in packet, including the identifier byte.
    #[must_use]
    pub fn bytes(&self) -> usize {
        PropertyType::bytes()
            + match self {
                Self::PayloadFormatIndicator(_)
                | Self::RequestProblemInformation(_)
                | Self::RequestResponseInformation(_)
                | Self::MaximumQoS(_)
                | Self::RetainAvailable(_)
                | Self::WildcardSubscriptionAvailable(_)
                | Self::SubscriptionIdentifierAvailable(_)
                | Self::SharedSubscriptionAvailable(_) => BoolData::bytes(),
                Self::MessageExpiryInterval(_)
                | Self::SessionExpiryInterval(_)
                | Self::WillDelayInterval(_)
                | Self::MaximumPacketSize(_) => U32Data::bytes(),
                Self::ServerKeepAlive(_)
                | Self::ReceiveMaximum(_)
                | Self::TopicAliasMaximum(_)
                | Self::TopicAlias(_) => U16Data::bytes(),
                Self::ContentType(v)
                | Self::ResponseTopic(v)
                | Self::AssignedClientIdentifier(v)
                | Self::AuthenticationMethod(v)
                | Self::ResponseInformation(v)
                | Self::ServerReference(v)
                | Self::ReasonString(v) => v.bytes(),
                Self::CorrelationData(v) | Self::AuthenticationData(v) => v.bytes(),
                Self::SubscriptionIdentifier(v) => v.bytes(),
                Self::UserProperty(v) => v.bytes(),
            }
    }
}

impl DecodePacket for Property {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type = PropertyType::try_from(ba.read_byte()?)?;
        match property_type {
            PropertyType::PayloadFormatIndicator => {
                Ok(Self::PayloadFormatIndicator(BoolData::decode(ba)?))
            }
            PropertyType::MessageExpiryInterval => {
                Ok(Self::MessageExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::ContentType => Ok(Self::ContentType(StringData::decode(ba)?)),
            PropertyType::ResponseTopic => Ok(Self::ResponseTopic(StringData::decode(ba)?)),
            PropertyType::CorrelationData => Ok(Self::CorrelationData(BinaryData::decode(ba)?)),
            PropertyType::SubscriptionIdentifier => {
                Ok(Self::SubscriptionIdentifier(VarInt::decode(ba)?))
            }
            PropertyType::SessionExpiryInterval => {
                Ok(Self::SessionExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::AssignedClientIdentifier => {
                Ok(Self::AssignedClientIdentifier(StringData::decode(ba)?))
            }
            PropertyType::ServerKeepAlive => Ok(Self::ServerKeepAlive(U16Data::decode(ba)?)),
            PropertyType::AuthenticationMethod => {
                Ok(Self::AuthenticationMethod(StringData::decode(ba)?))
            }
            PropertyType::AuthenticationData => {
                Ok(Self::AuthenticationData(BinaryData::decode(ba)?))
            }
            PropertyType::RequestProblemInformation => {
                Ok(Self::RequestProblemInformation(BoolData::decode(ba)?))
            }
            PropertyType::WillDelayInterval => Ok(Self::WillDelayInterval(U32Data::decode(ba)?)),
            PropertyType::RequestResponseInformation => {
                Ok(Self::RequestResponseInformation(BoolData::decode(ba)?))
            }
            PropertyType::ResponseInformation => {
                Ok(Self::ResponseInformation(StringData::decode(ba)?))
            }
            PropertyType::ServerReference => Ok(Self::ServerReference(StringData::decode(ba)?)),
            PropertyType::ReasonString => Ok(Self::ReasonString(StringData::decode(ba)?)),
            PropertyType::ReceiveMaximum => Ok(Self::ReceiveMaximum(U16Data::decode(ba)?)),
            PropertyType::TopicAliasMaximum => Ok(Self::TopicAliasMaximum(U16Data::decode(ba)?)),
            PropertyType::TopicAlias => Ok(Self::TopicAlias(U16Data::decode(ba)?)),
            PropertyType::MaximumQoS => {
                let qos = QoS::try_from(ba.read_byte()?)?;
                Ok(Self::MaximumQoS(qos))
            }
            PropertyType::RetainAvailable => Ok(Self::RetainAvailable(BoolData::decode(ba)?)),
            PropertyType::UserProperty => Ok(Self::UserProperty(StringPairData::decode(ba)?)),
            PropertyType::MaximumPacketSize => Ok(Self::MaximumPacketSize(U32Data::decode(ba)?)),
            PropertyType::WildcardSubscriptionAvailable => {
                Ok(Self::WildcardSubscriptionAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SubscriptionIdentifierAvailable => Ok(
                Self::SubscriptionIdentifierAvailable(BoolData::decode(ba)?),
            ),
            PropertyType::SharedSubscriptionAvailable => {
                Ok(Self::SharedSubscriptionAvailable(BoolData::decode(ba)?))
            }
        }
    }
}

impl EncodePacket for Property {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.property_type() as u8);
        let value_bytes = match self {
            Self::PayloadFormatIndicator(v)
            | Self::RequestProblemInformation(v)
            | Self::RequestResponseInformation(v)
            | Self::RetainAvailable(v)
            | Self::WildcardSubscriptionAvailable(v)
            | Self::SubscriptionIdentifierAvailable(v)
            | Self::SharedSubscriptionAvailable(v) => v.encode(buf)?,
            Self::MaximumQoS(qos) => {
                buf.push(*qos as u8);
                QoS::bytes()
            }
            Self::MessageExpiryInterval(v)
            | Self::SessionExpiryInterval(v)
            | Self::WillDelayInterval(v)
            | Self::MaximumPacketSize(v) => v.encode(buf)?,
            Self::ServerKeepAlive(v)
            | Self::ReceiveMaximum(v)
            | Self::TopicAliasMaximum(v)
            | Self::TopicAlias(v) => v.encode(buf)?,
            Self::ContentType(v)
            | Self::ResponseTopic(v)
            | Self::AssignedClientIdentifier(v)
            | Self::AuthenticationMethod(v)
            | Self::ResponseInformation(v)
            | Self::ServerReference(v)
            | Self::ReasonString(v) => v.encode(buf)?,
            Self::CorrelationData(v) | Self::AuthenticationData(v) => v.encode(buf)?,
            Self::SubscriptionIdentifier(v) => v.encode(buf)?,
            Self::UserProperty(v) => v.encode(buf)?,
        };
        Ok(PropertyType::bytes() + value_bytes)
    }
}

/// A property table: a variable byte integer holding the total property
/// length, followed by that many bytes of properties.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Properties {
    props: Vec<Property>,
}

impl Properties {
    /// Create an empty property table.
    #[must_use]
    pub const fn new() -> Self {
        Self { props: Vec::new() }
    }

    #[must_use]
    pub fn props(&self) -> &[Property] {
        &self.props
    }

    pub fn push(&mut self, property: Property) -> &mut Self {
        self.props.push(property);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    fn props_bytes(&self) -> usize {
        self.props.iter().map(Property::bytes).sum()
    }

    /// Get byte length in packet, including the length prefix.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let total = self.props_bytes();
        VarInt::from(total).map_or(0, |v| v.bytes()) + total
    }
}

impl From<Vec<Property>> for Properties {
    fn from(props: Vec<Property>) -> Self {
        Self { props }
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let total = VarInt::decode(ba)?.value();
        let end = ba.offset() + total;
        let mut props = Vec::new();
        while ba.offset() < end {
            props.push(Property::decode(ba)?);
        }
        if ba.offset() != end {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(Self { props })
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let total = VarInt::from(self.props_bytes())?;
        total.encode(buf)?;
        for property in &self.props {
            property.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }
}
