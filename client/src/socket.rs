// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::sync::Arc;

use crate::settings::ConnectionSettings;

/// Event reported by a socket when its I/O is advanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The connect attempt finished; `true` on success.
    Connected(bool),

    /// The transport closed.
    Disconnected,

    /// One complete inbound control packet.
    DataReceived(Vec<u8>),
}

/// Transport capability consumed by the reactor.
///
/// `connect` and `disconnect` only initiate; their outcome, along with
/// inbound data, is reported through the events returned from `tick`.
/// The reactor drains those events into the current state before its own
/// tick returns, so delivery is synchronous with respect to the tick loop.
pub trait Socket: Send {
    /// Asynchronously initiate a connection.
    fn connect(&mut self);

    /// Write bytes to the transport. Must not block; the implementation
    /// buffers or signals backpressure on its own.
    fn send(&mut self, data: &[u8]);

    /// Initiate a graceful close.
    fn disconnect(&mut self);

    /// Advance I/O and report what happened since the previous call.
    fn tick(&mut self) -> Vec<SocketEvent>;
}

/// Settings-driven socket construction.
pub type SocketFactory = Arc<dyn Fn(&ConnectionSettings) -> Box<dyn Socket> + Send + Sync>;
