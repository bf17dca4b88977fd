// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::{Duration, Instant};

use codec::{v3, v5, ProtocolVersion};

use super::{auth, DisconnectedState, ReadyState, State, Transition};
use crate::command::{resolve, Command, ResultSender};
use crate::context::Context;
use crate::error::Error;
use crate::wire::{self, ConnectParams, ControlPacket};

/// A transport connect is in flight, or the CONNECT/CONNACK handshake is
/// underway (possibly interleaved with an AUTH exchange).
pub struct ConnectingState {
    clean_session: bool,
    promise: Option<ResultSender<()>>,
    handshake_deadline: Option<Instant>,
}

impl ConnectingState {
    #[must_use]
    pub fn new(clean_session: bool, promise: ResultSender<()>) -> Self {
        Self {
            clean_session,
            promise: Some(promise),
            handshake_deadline: None,
        }
    }

    fn fail(&mut self, error: Error) {
        if let Some(promise) = self.promise.take() {
            resolve(promise, Err(error));
        }
    }

    fn fail_and_disconnect(&mut self, error: Error) -> Transition {
        self.fail(error);
        Transition::to(DisconnectedState::new(false))
    }

    fn handle_conn_ack(&mut self, ctx: &mut Context, packet: &ControlPacket) -> Transition {
        let success = match packet {
            ControlPacket::V5(v5::Packet::ConnectAck(ack)) => {
                let success = ack.reason_code() == v5::ReasonCode::Success;
                if success {
                    if let Some(assigned) = ack.assigned_client_id() {
                        log::info!("connecting: broker assigned client id {assigned:?}");
                        ctx.set_assigned_client_id(assigned.to_string());
                    }
                }
                success
            }
            ControlPacket::V3(v3::Packet::ConnectAck(ack)) => {
                ack.return_code() == v3::ConnectReturnCode::Accepted
            }
            _ => false,
        };

        if success {
            if let Some(promise) = self.promise.take() {
                resolve(promise, Ok(()));
            }
            Transition::to(ReadyState::new())
        } else {
            self.fail_and_disconnect(Error::ConnectionRefused)
        }
    }
}

impl State for ConnectingState {
    fn name(&self) -> &'static str {
        "Connecting"
    }

    fn on_enter(&mut self, ctx: &mut Context) -> Transition {
        if !ctx.has_socket() {
            let Some(factory) = ctx.settings().socket_factory().cloned() else {
                return self.fail_and_disconnect(Error::NoSocketFactory);
            };
            let socket = factory(ctx.settings());
            ctx.set_socket(Some(socket));
        }

        if let Some(socket) = ctx.socket_mut() {
            socket.connect();
        }

        Transition::Stay
    }

    fn on_exit(&mut self, _ctx: &mut Context) {
        self.fail(Error::ConnectionInterrupted);
    }

    fn handle_command(&mut self, _ctx: &mut Context, _command: Command) -> Transition {
        Transition::Stay
    }

    fn on_socket_connected(&mut self, ctx: &mut Context) -> Transition {
        let settings = ctx.settings().clone();
        let protocol_version = ctx.protocol_version();

        let mut username = String::new();
        let mut password = String::new();
        let mut auth_method = String::new();
        let mut initial_auth_data = Vec::new();

        if let Some(provider) = settings.credentials_provider() {
            let credentials = provider.credentials();
            username = credentials.username;
            password = credentials.password;

            if protocol_version == ProtocolVersion::V5 {
                auth_method = provider.auth_method();
                initial_auth_data = provider.initial_auth_data();
            }
        }

        let client_id = ctx.effective_client_id().to_string();
        let params = ConnectParams {
            client_id: &client_id,
            keep_alive: settings.keep_alive_interval_seconds(),
            clean_session: self.clean_session,
            username: &username,
            password: &password,
            auth_method: &auth_method,
            initial_auth_data: &initial_auth_data,
            will: settings.will(),
        };

        match wire::encode_connect(protocol_version, &params) {
            Ok(buf) => ctx.send_packet(&buf),
            Err(err) => {
                log::error!("connecting: failed to encode CONNECT: {err:?}");
                return self.fail_and_disconnect(Error::EncodingFailed);
            }
        }

        self.handshake_deadline =
            Some(Instant::now() + Duration::from_secs(settings.connect_timeout_seconds()));

        Transition::Stay
    }

    fn on_socket_disconnected(&mut self, _ctx: &mut Context) -> Transition {
        self.fail_and_disconnect(Error::ConnectionFailed)
    }

    fn on_data_received(&mut self, ctx: &mut Context, data: &[u8]) -> Transition {
        let Some(packet) = ctx.parse_packet(data) else {
            return self.fail_and_disconnect(Error::MalformedPacket);
        };

        match &packet {
            ControlPacket::V5(v5::Packet::Auth(auth_packet)) => {
                let auth_packet = auth_packet.clone();
                auth::handle(ctx, &auth_packet, &mut self.promise)
            }
            ControlPacket::V3(v3::Packet::ConnectAck(_))
            | ControlPacket::V5(v5::Packet::ConnectAck(_)) => self.handle_conn_ack(ctx, &packet),
            other => {
                log::warn!(
                    "connecting: unexpected packet type {:?} (expected AUTH or CONNACK)",
                    other.packet_type()
                );
                if ctx.settings().strict_mode() {
                    return self.fail_and_disconnect(Error::UnexpectedPacket);
                }
                Transition::Stay
            }
        }
    }

    fn on_tick(&mut self, _ctx: &mut Context) -> Transition {
        if let Some(deadline) = self.handshake_deadline {
            if Instant::now() > deadline {
                log::error!("connecting: handshake timeout");
                return self.fail_and_disconnect(Error::HandshakeTimeout);
            }
        }
        Transition::Stay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ConnectionSettings;
    use futures::channel::oneshot;
    use std::sync::Arc;

    fn test_context() -> Context {
        Context::new(Arc::new(ConnectionSettings::default()))
    }

    #[test]
    fn test_conn_ack_success_enters_ready() {
        let mut ctx = test_context();
        let (tx, mut rx) = oneshot::channel();
        let mut state = ConnectingState::new(true, tx);

        let transition = state.on_data_received(&mut ctx, &[0x20, 0x03, 0x00, 0x00, 0x00]);
        match transition {
            Transition::To(next) => assert_eq!(next.name(), "Ready"),
            Transition::Stay => panic!("expected transition to Ready"),
        }
        assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
    }

    #[test]
    fn test_conn_ack_refusal_fails_promise() {
        let mut ctx = test_context();
        let (tx, mut rx) = oneshot::channel();
        let mut state = ConnectingState::new(true, tx);

        // Reason code 0x87: not authorized.
        let transition = state.on_data_received(&mut ctx, &[0x20, 0x03, 0x00, 0x87, 0x00]);
        match transition {
            Transition::To(next) => assert_eq!(next.name(), "Disconnected"),
            Transition::Stay => panic!("expected transition to Disconnected"),
        }
        assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::ConnectionRefused)));
    }

    #[test]
    fn test_garbage_fails_handshake() {
        let mut ctx = test_context();
        let (tx, mut rx) = oneshot::channel();
        let mut state = ConnectingState::new(true, tx);

        let transition = state.on_data_received(&mut ctx, &[0x00, 0x00]);
        assert!(matches!(transition, Transition::To(_)));
        assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::MalformedPacket)));
    }

    #[test]
    fn test_exit_fails_unresolved_promise() {
        let mut ctx = test_context();
        let (tx, mut rx) = oneshot::channel();
        let mut state = ConnectingState::new(true, tx);
        state.on_exit(&mut ctx);
        assert_eq!(
            rx.try_recv().unwrap(),
            Some(Err(Error::ConnectionInterrupted))
        );
    }

    #[test]
    fn test_socket_drop_fails_connect() {
        let mut ctx = test_context();
        let (tx, mut rx) = oneshot::channel();
        let mut state = ConnectingState::new(true, tx);
        let transition = state.on_socket_disconnected(&mut ctx);
        assert!(matches!(transition, Transition::To(_)));
        assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::ConnectionFailed)));
    }

    #[test]
    fn test_assigned_client_id_is_captured() {
        let mut ctx = test_context();
        let (tx, _rx) = oneshot::channel();
        let mut state = ConnectingState::new(true, tx);

        // CONNACK with an AssignedClientIdentifier property of "srv-1".
        let data = [
            0x20, 0x0b, 0x00, 0x00, 0x08, 0x12, 0x00, 0x05, b's', b'r', b'v', b'-', b'1',
        ];
        state.on_data_received(&mut ctx, &data);
        assert_eq!(ctx.assigned_client_id(), "srv-1");
    }
}
