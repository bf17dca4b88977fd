// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// A Reason Code is a one byte unsigned value that indicates the result of
/// an operation. It is used across acknowledgement, authentication and
/// disconnect flows; each packet type accepts its own subset.
///
/// The value 0x00 serves three spec names at once: Success, Normal
/// disconnection, and Granted `QoS` 0.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    /// Success / Normal disconnection / Granted `QoS` 0.
    #[default]
    Success = 0x00,

    /// SUBACK: granted with `QoS` 1.
    GrantedQualityOfService1 = 0x01,

    /// SUBACK: granted with `QoS` 2.
    GrantedQualityOfService2 = 0x02,

    /// DISCONNECT: close the connection but send the will message.
    DisconnectWithWillMessage = 0x04,

    /// PUBACK/PUBREC: no subscribers matched the topic.
    NoMatchingSubscribers = 0x10,

    /// UNSUBACK: no subscription existed for the filter.
    NoSubscriptionExisted = 0x11,

    /// AUTH: continue the authentication exchange.
    ContinueAuthentication = 0x18,

    /// AUTH: initiate re-authentication.
    ReAuthenticate = 0x19,

    /// Generic error without a more specific reason.
    UnspecifiedError = 0x80,

    /// Packet failed basic format checks.
    MalformedPacket = 0x81,

    /// Protocol rule violated.
    ProtocolError = 0x82,

    /// Implementation-specific failure.
    ImplementationSpecificError = 0x83,

    /// CONNACK: protocol version not supported.
    UnsupportedProtocolVersion = 0x84,

    /// CONNACK: client identifier rejected.
    ClientIdentifierNotValid = 0x85,

    /// CONNACK: credentials invalid.
    BadUserNameOrPassword = 0x86,

    /// Operation not authorized.
    NotAuthorized = 0x87,

    /// CONNACK: broker cannot accept connections.
    ServerUnavailable = 0x88,

    /// Broker busy; try again later.
    ServerBusy = 0x89,

    /// CONNACK: client banned.
    Banned = 0x8a,

    /// Broker is shutting down.
    ServerShuttingDown = 0x8b,

    /// Bad or unsupported authentication method.
    BadAuthenticationMethod = 0x8c,

    /// No PINGRESP within the keepalive window.
    KeepAliveTimeout = 0x8d,

    /// Session taken over by another connection with the same client id.
    SessionTakenOver = 0x8e,

    /// Topic filter is malformed or not allowed.
    TopicFilterInvalid = 0x8f,

    /// Topic name invalid for this operation.
    TopicNameInvalid = 0x90,

    /// Packet identifier already in use.
    PacketIdentifierInUse = 0x91,

    /// Packet identifier not found.
    PacketIdentifierNotFound = 0x92,

    /// Receive Maximum exceeded.
    ReceiveMaximumExceeded = 0x93,

    /// Topic alias invalid.
    TopicAliasInvalid = 0x94,

    /// Packet exceeds the allowed maximum size.
    PacketTooLarge = 0x95,

    /// Throttled due to message rate.
    MessageRateTooHigh = 0x96,

    /// Quota exceeded.
    QuotaExceeded = 0x97,

    /// Administrative disconnect.
    AdministrativeAction = 0x98,

    /// Payload format does not match its indicator.
    PayloadFormatInvalid = 0x99,

    /// Retained messages not supported.
    RetainNotSupported = 0x9a,

    /// Requested `QoS` not supported.
    QoSNotSupported = 0x9b,

    /// Temporarily use another server.
    UseAnotherServer = 0x9c,

    /// Server moved permanently.
    ServerMoved = 0x9d,

    /// Shared subscriptions not supported.
    SharedSubscriptionsNotSupported = 0x9e,

    /// Connection attempts too frequent.
    ConnectionRateExceeded = 0x9f,

    /// Maximum connect time exceeded.
    MaximumConnectTime = 0xa0,

    /// Subscription identifiers not supported.
    SubscriptionIdentifiersNotSupported = 0xa1,

    /// Wildcard subscriptions not supported.
    WildcardSubscriptionsNotSupported = 0xa2,
}

impl ReasonCode {
    /// Get byte length used in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for ReasonCode {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x00 => Ok(Self::Success),
            0x01 => Ok(Self::GrantedQualityOfService1),
            0x02 => Ok(Self::GrantedQualityOfService2),
            0x04 => Ok(Self::DisconnectWithWillMessage),
            0x10 => Ok(Self::NoMatchingSubscribers),
            0x11 => Ok(Self::NoSubscriptionExisted),
            0x18 => Ok(Self::ContinueAuthentication),
            0x19 => Ok(Self::ReAuthenticate),
            0x80 => Ok(Self::UnspecifiedError),
            0x81 => Ok(Self::MalformedPacket),
            0x82 => Ok(Self::ProtocolError),
            0x83 => Ok(Self::ImplementationSpecificError),
            0x84 => Ok(Self::UnsupportedProtocolVersion),
            0x85 => Ok(Self::ClientIdentifierNotValid),
            0x86 => Ok(Self::BadUserNameOrPassword),
            0x87 => Ok(Self::NotAuthorized),
            0x88 => Ok(Self::ServerUnavailable),
            0x89 => Ok(Self::ServerBusy),
            0x8a => Ok(Self::Banned),
            0x8b => Ok(Self::ServerShuttingDown),
            0x8c => Ok(Self::BadAuthenticationMethod),
            0x8d => Ok(Self::KeepAliveTimeout),
            0x8e => Ok(Self::SessionTakenOver),
            0x8f => Ok(Self::TopicFilterInvalid),
            0x90 => Ok(Self::TopicNameInvalid),
            0x91 => Ok(Self::PacketIdentifierInUse),
            0x92 => Ok(Self::PacketIdentifierNotFound),
            0x93 => Ok(Self::ReceiveMaximumExceeded),
            0x94 => Ok(Self::TopicAliasInvalid),
            0x95 => Ok(Self::PacketTooLarge),
            0x96 => Ok(Self::MessageRateTooHigh),
            0x97 => Ok(Self::QuotaExceeded),
            0x98 => Ok(Self::AdministrativeAction),
            0x99 => Ok(Self::PayloadFormatInvalid),
            0x9a => Ok(Self::RetainNotSupported),
            0x9b => Ok(Self::QoSNotSupported),
            0x9c => Ok(Self::UseAnotherServer),
            0x9d => Ok(Self::ServerMoved),
            0x9e => Ok(Self::SharedSubscriptionsNotSupported),
            0x9f => Ok(Self::ConnectionRateExceeded),
            0xa0 => Ok(Self::MaximumConnectTime),
            0xa1 => Ok(Self::SubscriptionIdentifiersNotSupported),
            0xa2 => Ok(Self::WildcardSubscriptionsNotSupported),
            _ => Err(DecodeError::InvalidReasonCode),
        }
    }
}

impl DecodePacket for ReasonCode {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let byte = ba.read_byte()?;
        Self::try_from(byte)
    }
}

impl EncodePacket for ReasonCode {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(*self as u8);
        Ok(Self::bytes())
    }
}
