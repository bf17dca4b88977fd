// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt;
use std::sync::Arc;

use codec::utils::random_string;
use codec::{ProtocolVersion, MAX_VAR_INT};

use crate::message::Message;
use crate::socket::SocketFactory;

/// Username/password pair supplied by a credentials provider.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Supplies connect credentials and drives the MQTT 5.0 enhanced
/// authentication exchange.
pub trait CredentialsProvider: Send + Sync {
    /// Username and password for the CONNECT packet.
    fn credentials(&self) -> Credentials;

    /// Authentication method name for the CONNECT properties (MQTT 5.0).
    /// An empty string disables enhanced authentication.
    fn auth_method(&self) -> String {
        String::new()
    }

    /// Initial authentication data for the CONNECT properties (MQTT 5.0).
    fn initial_auth_data(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Answer a broker AUTH challenge with client authentication data.
    fn on_auth_challenge(&self, _server_data: &[u8]) -> Vec<u8> {
        Vec::new()
    }
}

/// Runs user callbacks; the closure may be executed on any thread.
/// Without an executor, callbacks run synchronously on the reactor thread.
pub type CallbackExecutor = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Connection settings consumed by the reactor.
#[derive(Clone)]
pub struct ConnectionSettings {
    host: String,
    port: u16,
    client_id: String,
    protocol_version: ProtocolVersion,
    keep_alive_interval_seconds: u16,
    connect_timeout_seconds: u64,
    session_expiry_interval: u32,
    max_packet_size: usize,
    enforce_max_packet_size: bool,
    max_outbound_queue_bytes: usize,
    max_pending_commands: usize,
    auto_reconnect_enabled: bool,
    auto_reconnect_initial_delay_ms: u32,
    auto_reconnect_max_delay_ms: u32,
    auto_reconnect_multiplier: f64,
    strict_mode: bool,
    will: Option<Message>,
    socket_factory: Option<SocketFactory>,
    credentials_provider: Option<Arc<dyn CredentialsProvider>>,
    callback_executor: Option<CallbackExecutor>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: random_string(12),
            protocol_version: ProtocolVersion::default(),
            keep_alive_interval_seconds: 60,
            connect_timeout_seconds: 30,
            session_expiry_interval: 0,
            max_packet_size: MAX_VAR_INT,
            enforce_max_packet_size: false,
            max_outbound_queue_bytes: 1024 * 1024,
            max_pending_commands: 100,
            auto_reconnect_enabled: false,
            auto_reconnect_initial_delay_ms: 1000,
            auto_reconnect_max_delay_ms: 60_000,
            auto_reconnect_multiplier: 2.0,
            strict_mode: false,
            will: None,
            socket_factory: None,
            credentials_provider: None,
            callback_executor: None,
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("keep_alive_interval_seconds", &self.keep_alive_interval_seconds)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("session_expiry_interval", &self.session_expiry_interval)
            .field("strict_mode", &self.strict_mode)
            .field("auto_reconnect_enabled", &self.auto_reconnect_enabled)
            .finish_non_exhaustive()
    }
}

impl ConnectionSettings {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    pub fn set_host(&mut self, host: &str) -> &mut Self {
        self.host = host.to_string();
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn set_client_id(&mut self, client_id: &str) -> &mut Self {
        self.client_id = client_id.to_string();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Protocol version to speak. Fixed for the lifetime of a session;
    /// negotiation happens before the first encoded packet.
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) -> &mut Self {
        self.protocol_version = version;
        self
    }

    #[must_use]
    pub const fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Keepalive interval in seconds; 0 disables keepalive supervision.
    pub fn set_keep_alive_interval_seconds(&mut self, seconds: u16) -> &mut Self {
        self.keep_alive_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn keep_alive_interval_seconds(&self) -> u16 {
        self.keep_alive_interval_seconds
    }

    /// Deadline for the CONNECT/CONNACK handshake, in seconds.
    pub fn set_connect_timeout_seconds(&mut self, seconds: u64) -> &mut Self {
        self.connect_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn connect_timeout_seconds(&self) -> u64 {
        self.connect_timeout_seconds
    }

    /// Session expiry in seconds. A zero value also makes
    /// auto-reconnect request a clean session.
    pub fn set_session_expiry_interval(&mut self, seconds: u32) -> &mut Self {
        self.session_expiry_interval = seconds;
        self
    }

    #[must_use]
    pub const fn session_expiry_interval(&self) -> u32 {
        self.session_expiry_interval
    }

    pub fn set_max_packet_size(&mut self, bytes: usize) -> &mut Self {
        self.max_packet_size = bytes;
        self
    }

    #[must_use]
    pub const fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn set_enforce_max_packet_size(&mut self, enforce: bool) -> &mut Self {
        self.enforce_max_packet_size = enforce;
        self
    }

    #[must_use]
    pub const fn enforce_max_packet_size(&self) -> bool {
        self.enforce_max_packet_size
    }

    pub fn set_max_outbound_queue_bytes(&mut self, bytes: usize) -> &mut Self {
        self.max_outbound_queue_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn max_outbound_queue_bytes(&self) -> usize {
        self.max_outbound_queue_bytes
    }

    pub fn set_max_pending_commands(&mut self, count: usize) -> &mut Self {
        self.max_pending_commands = count;
        self
    }

    #[must_use]
    pub const fn max_pending_commands(&self) -> usize {
        self.max_pending_commands
    }

    pub fn set_auto_reconnect_enabled(&mut self, enabled: bool) -> &mut Self {
        self.auto_reconnect_enabled = enabled;
        self
    }

    #[must_use]
    pub const fn auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect_enabled
    }

    pub fn set_auto_reconnect_initial_delay_ms(&mut self, ms: u32) -> &mut Self {
        self.auto_reconnect_initial_delay_ms = ms;
        self
    }

    #[must_use]
    pub const fn auto_reconnect_initial_delay_ms(&self) -> u32 {
        self.auto_reconnect_initial_delay_ms
    }

    pub fn set_auto_reconnect_max_delay_ms(&mut self, ms: u32) -> &mut Self {
        self.auto_reconnect_max_delay_ms = ms;
        self
    }

    #[must_use]
    pub const fn auto_reconnect_max_delay_ms(&self) -> u32 {
        self.auto_reconnect_max_delay_ms
    }

    pub fn set_auto_reconnect_multiplier(&mut self, multiplier: f64) -> &mut Self {
        self.auto_reconnect_multiplier = multiplier;
        self
    }

    #[must_use]
    pub const fn auto_reconnect_multiplier(&self) -> f64 {
        self.auto_reconnect_multiplier
    }

    /// In strict mode any unexpected or malformed packet forces a disconnect.
    pub fn set_strict_mode(&mut self, strict: bool) -> &mut Self {
        self.strict_mode = strict;
        self
    }

    #[must_use]
    pub const fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Will message published by the broker on an abnormal disconnect.
    pub fn set_will(&mut self, will: Option<Message>) -> &mut Self {
        self.will = will;
        self
    }

    #[must_use]
    pub const fn will(&self) -> Option<&Message> {
        self.will.as_ref()
    }

    pub fn set_socket_factory(&mut self, factory: SocketFactory) -> &mut Self {
        self.socket_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn socket_factory(&self) -> Option<&SocketFactory> {
        self.socket_factory.as_ref()
    }

    pub fn set_credentials_provider(
        &mut self,
        provider: Arc<dyn CredentialsProvider>,
    ) -> &mut Self {
        self.credentials_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn credentials_provider(&self) -> Option<&Arc<dyn CredentialsProvider>> {
        self.credentials_provider.as_ref()
    }

    pub fn set_callback_executor(&mut self, executor: CallbackExecutor) -> &mut Self {
        self.callback_executor = Some(executor);
        self
    }

    #[must_use]
    pub fn callback_executor(&self) -> Option<&CallbackExecutor> {
        self.callback_executor.as_ref()
    }
}
