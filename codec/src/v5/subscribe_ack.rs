// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, VarIntError,
};

use super::property::check_property_type_list;
use super::{Properties, PropertyType, ReasonCode};

/// Per-filter reason codes the broker may send in a SUBACK [MQTT-3.9.3-2].
pub const SUBSCRIBE_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::GrantedQualityOfService1,
    ReasonCode::GrantedQualityOfService2,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
    ReasonCode::QuotaExceeded,
    ReasonCode::SharedSubscriptionsNotSupported,
    ReasonCode::SubscriptionIdentifiersNotSupported,
    ReasonCode::WildcardSubscriptionsNotSupported,
];

/// Properties available in subscribe ack packets.
pub const SUBSCRIBE_ACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// `SubscribeAckPacket` is the broker reply to a Subscribe packet, carrying
/// one reason code per requested topic filter, in request order.
///
/// ```txt
///  7                  0
/// +--------------------+
/// | Fixed header       |
/// |                    |
/// +--------------------+
/// | Packet id          |
/// |                    |
/// +--------------------+
/// | Properties ...     |
/// +--------------------+
/// | Reason code 0      |
/// +--------------------+
/// | Reason code 1      |
/// +--------------------+
/// | ...                |
/// +--------------------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscribeAckPacket {
    packet_id: PacketId,
    properties: Properties,
    reason_codes: Vec<ReasonCode>,
}

impl SubscribeAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            properties: Properties::new(),
            reason_codes,
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub fn reason_codes(&self) -> &[ReasonCode] {
        &self.reason_codes
    }

    fn remaining_length(&self) -> usize {
        PacketId::bytes() + self.properties.bytes() + self.reason_codes.len() * ReasonCode::bytes()
    }
}

impl EncodePacket for SubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = FixedHeader::new(PacketType::SubscribeAck, self.remaining_length())?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        self.properties.encode(buf)?;
        for reason_code in &self.reason_codes {
            reason_code.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for SubscribeAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::SubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }
        if fixed_header.remaining_length() < PacketId::bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }

        let body_start = ba.offset();
        let packet_id = PacketId::decode(ba)?;

        let properties = Properties::decode(ba)?;
        if let Err(property_type) =
            check_property_type_list(properties.props(), SUBSCRIBE_ACK_PROPERTIES)
        {
            log::error!(
                "v5/SubscribeAckPacket: property type {property_type:?} cannot be used in properties!"
            );
            return Err(DecodeError::InvalidPropertyType);
        }

        let mut reason_codes = Vec::new();
        while ba.offset() - body_start < fixed_header.remaining_length() {
            let reason_code = ReasonCode::decode(ba)?;
            if !SUBSCRIBE_REASONS.contains(&reason_code) {
                log::error!("v5/SubscribeAckPacket: invalid reason code: {reason_code:?}");
                return Err(DecodeError::InvalidReasonCode);
            }
            reason_codes.push(reason_code);
        }

        Ok(Self {
            packet_id,
            properties,
            reason_codes,
        })
    }
}

impl Packet for SubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubscribeAck
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(PacketType::SubscribeAck, self.remaining_length())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_mixed_codes() {
        let buf = [0x90, 0x06, 0x00, 0x07, 0x00, 0x01, 0x02, 0x87];
        let mut ba = ByteArray::new(&buf);
        let packet = SubscribeAckPacket::decode(&mut ba).unwrap();
        assert_eq!(packet.packet_id(), PacketId::new(7));
        assert_eq!(
            packet.reason_codes(),
            &[
                ReasonCode::GrantedQualityOfService1,
                ReasonCode::GrantedQualityOfService2,
                ReasonCode::NotAuthorized,
            ]
        );
    }

    #[test]
    fn test_round_trip() {
        let packet = SubscribeAckPacket::new(
            PacketId::new(3),
            vec![ReasonCode::Success, ReasonCode::QuotaExceeded],
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(SubscribeAckPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_reject_foreign_code() {
        // NoSubscriptionExisted belongs to UNSUBACK.
        let buf = [0x90, 0x04, 0x00, 0x07, 0x00, 0x11];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            SubscribeAckPacket::decode(&mut ba),
            Err(DecodeError::InvalidReasonCode)
        );
    }
}
