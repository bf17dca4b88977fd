// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::{Duration, Instant};

use super::{DisconnectedState, State, Transition};
use crate::command::{resolve, Command, ResultSender};
use crate::context::Context;
use crate::error::Error;
use crate::wire;

/// How long a graceful close may take before the socket is forced shut.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A DISCONNECT has been sent and the transport is winding down.
pub struct ClosingState {
    promise: Option<ResultSender<()>>,
    entry_time: Instant,
}

impl ClosingState {
    #[must_use]
    pub fn new(promise: ResultSender<()>) -> Self {
        Self {
            promise: Some(promise),
            entry_time: Instant::now(),
        }
    }
}

impl State for ClosingState {
    fn name(&self) -> &'static str {
        "Closing"
    }

    fn on_enter(&mut self, ctx: &mut Context) -> Transition {
        match wire::encode_disconnect(ctx.protocol_version()) {
            Ok(buf) => ctx.send_packet(&buf),
            Err(err) => log::error!("closing: failed to encode DISCONNECT: {err:?}"),
        }

        if let Some(socket) = ctx.socket_mut() {
            socket.disconnect();
        }

        Transition::Stay
    }

    fn on_exit(&mut self, ctx: &mut Context) {
        // The session is over; whatever is still unacknowledged will never
        // resolve on its own.
        ctx.cancel_all_pending(Error::ConnectionInterrupted);

        if let Some(promise) = self.promise.take() {
            resolve(promise, Ok(()));
        }

        let delegate = ctx.on_disconnect().clone();
        ctx.invoke_callback(move || {
            delegate.broadcast(&true);
        });
    }

    fn handle_command(&mut self, ctx: &mut Context, command: Command) -> Transition {
        match command {
            Command::CloseSocket => {
                if let Some(socket) = ctx.socket_mut() {
                    socket.disconnect();
                }
                Transition::to(DisconnectedState::new(true))
            }
            Command::Connect { promise, .. } => {
                resolve(promise, Err(Error::ConnectWhileClosing));
                Transition::Stay
            }
            Command::Publish(cmd) => {
                resolve(cmd.promise, Err(Error::PublishWhileClosing));
                Transition::Stay
            }
            Command::Subscribe(cmd) => {
                resolve(cmd.promise, Err(Error::SubscribeWhileClosing));
                Transition::Stay
            }
            Command::Subscribes(cmd) => {
                resolve(cmd.promise, Err(Error::SubscribeWhileClosing));
                Transition::Stay
            }
            Command::Unsubscribes(cmd) => {
                resolve(cmd.promise, Err(Error::UnsubscribeWhileClosing));
                Transition::Stay
            }
            Command::Disconnect { promise } => {
                resolve(promise, Ok(()));
                Transition::Stay
            }
        }
    }

    fn on_socket_disconnected(&mut self, _ctx: &mut Context) -> Transition {
        Transition::to(DisconnectedState::new(true))
    }

    fn on_data_received(&mut self, _ctx: &mut Context, _data: &[u8]) -> Transition {
        Transition::Stay
    }

    fn on_tick(&mut self, ctx: &mut Context) -> Transition {
        if self.entry_time.elapsed() >= CLOSE_TIMEOUT {
            log::warn!("closing: close deadline passed, forcing socket shut");
            if let Some(socket) = ctx.socket_mut() {
                socket.disconnect();
            }
            return Transition::to(DisconnectedState::new(true));
        }

        Transition::Stay
    }
}
