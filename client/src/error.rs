// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::error;
use std::fmt;

/// Failure reported to the caller of a client operation.
///
/// Every user-initiated operation resolves its future exactly once,
/// either with success or with one of these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Operation requires a live session.
    NotConnected,

    /// The pending-command cap is reached.
    MaxPendingCommands,

    /// All 65535 packet ids are in flight.
    PacketIdPoolExhausted,

    /// The outbound byte accounting cap is reached.
    OutboundQueueFull,

    /// No acknowledgment arrived for a `QoS` > 0 publish in time.
    PublishTimeout,

    /// No CONNACK arrived within the configured connect timeout.
    HandshakeTimeout,

    /// The connect attempt was abandoned by a state change.
    ConnectionInterrupted,

    /// The transport could not be established or dropped mid-handshake.
    ConnectionFailed,

    /// The broker answered the handshake with a non-success code.
    ConnectionRefused,

    /// The handshake reply could not be parsed.
    MalformedPacket,

    /// Strict mode rejected an unexpected packet.
    UnexpectedPacket,

    /// The broker ended the enhanced auth exchange with a failure.
    AuthenticationFailed,

    /// Enhanced authentication requires MQTT 5.0.
    AuthNotSupported,

    /// An AUTH challenge arrived but no credentials provider is configured.
    NoCredentialsProvider,

    /// The broker answered a subscribe with no per-filter codes.
    EmptySubscribeAck,

    /// A packet could not be serialized.
    EncodingFailed,

    /// No socket factory is configured.
    NoSocketFactory,

    ConnectWhileClosing,
    PublishWhileClosing,
    SubscribeWhileClosing,
    UnsubscribeWhileClosing,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Self::NotConnected => "Not connected",
            Self::MaxPendingCommands => "Max pending commands limit exceeded",
            Self::PacketIdPoolExhausted => "Packet ID pool exhausted",
            Self::OutboundQueueFull => "Outbound queue full",
            Self::PublishTimeout => "Publish timeout",
            Self::HandshakeTimeout => "Handshake timeout",
            Self::ConnectionInterrupted => "Connection interrupted",
            Self::ConnectionFailed => "Connection failed",
            Self::ConnectionRefused => "Connection refused by broker",
            Self::MalformedPacket => "Failed to parse packet",
            Self::UnexpectedPacket => "Unexpected packet (strict mode)",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AuthNotSupported => "AUTH not supported in MQTT 3.1.1",
            Self::NoCredentialsProvider => "No credentials provider",
            Self::EmptySubscribeAck => "Empty SUBACK",
            Self::EncodingFailed => "Failed to encode packet",
            Self::NoSocketFactory => "No socket factory configured",
            Self::ConnectWhileClosing => "Cannot connect while closing",
            Self::PublishWhileClosing => "Cannot publish while closing",
            Self::SubscribeWhileClosing => "Cannot subscribe while closing",
            Self::UnsubscribeWhileClosing => "Cannot unsubscribe while closing",
        };
        write!(f, "{msg}")
    }
}

impl error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_strings() {
        assert_eq!(Error::NotConnected.to_string(), "Not connected");
        assert_eq!(Error::PublishTimeout.to_string(), "Publish timeout");
        assert_eq!(
            Error::MaxPendingCommands.to_string(),
            "Max pending commands limit exceeded"
        );
        assert_eq!(
            Error::AuthNotSupported.to_string(),
            "AUTH not supported in MQTT 3.1.1"
        );
    }
}
