// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, StringData, VarIntError,
};

use super::property::check_property_type_list;
use super::{Properties, PropertyType};

/// Properties available in unsubscribe packets.
pub const UNSUBSCRIBE_PROPERTIES: &[PropertyType] = &[PropertyType::UserProperty];

/// Unsubscribe packet removes subscriptions for one or more topic filters.
///
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// |                       |
/// +-----------------------+
/// | Packet id             |
/// |                       |
/// +-----------------------+
/// | Properties ...        |
/// +-----------------------+
/// | Topic 0 length        |
/// |                       |
/// +-----------------------+
/// | Topic 0 ...           |
/// +-----------------------+
/// | ...                   |
/// +-----------------------+
/// ```
///
/// The payload MUST contain at least one filter [MQTT-3.10.3-2].
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    packet_id: PacketId,
    properties: Properties,
    topics: Vec<StringData>,
}

impl UnsubscribePacket {
    /// Create an unsubscribe packet from a list of topic filters.
    ///
    /// # Errors
    ///
    /// Returns error if `topics` is empty or a filter is too long.
    pub fn new(packet_id: PacketId, topics: &[&str]) -> Result<Self, EncodeError> {
        if topics.is_empty() {
            return Err(EncodeError::EmptyTopicFilters);
        }
        let topics = topics
            .iter()
            .map(|t| StringData::from(t))
            .collect::<Result<Vec<_>, EncodeError>>()?;
        Ok(Self {
            packet_id,
            properties: Properties::new(),
            topics,
        })
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
    pub fn topics(&self) -> &[StringData] {
        &self.topics
    }

    fn remaining_length(&self) -> usize {
        PacketId::bytes()
            + self.properties.bytes()
            + self.topics.iter().map(StringData::bytes).sum::<usize>()
    }
}

impl EncodePacket for UnsubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.topics.is_empty() {
            return Err(EncodeError::EmptyTopicFilters);
        }
        let old_len = buf.len();

        let fixed_header = FixedHeader::new(PacketType::Unsubscribe, self.remaining_length())?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        self.properties.encode(buf)?;
        for topic in &self.topics {
            topic.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for UnsubscribePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Unsubscribe {
            return Err(DecodeError::InvalidPacketType);
        }

        let body_start = ba.offset();
        let packet_id = PacketId::decode(ba)?;

        let properties = Properties::decode(ba)?;
        if let Err(property_type) =
            check_property_type_list(properties.props(), UNSUBSCRIBE_PROPERTIES)
        {
            log::error!("v5/UnsubscribePacket: property type {property_type:?} cannot be used in properties!");
            return Err(DecodeError::InvalidPropertyType);
        }

        let mut topics = Vec::new();
        while ba.offset() - body_start < fixed_header.remaining_length() {
            topics.push(StringData::decode(ba)?);
        }
        if topics.is_empty() {
            return Err(DecodeError::EmptyTopicFilters);
        }

        Ok(Self {
            packet_id,
            properties,
            topics,
        })
    }
}

impl Packet for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(PacketType::Unsubscribe, self.remaining_length())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let packet = UnsubscribePacket::new(PacketId::new(9), &["a/b", "c"]).unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0xa2);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(UnsubscribePacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_reject_empty_topics() {
        assert!(UnsubscribePacket::new(PacketId::new(1), &[]).is_err());
    }
}
