// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Instant;

use futures::channel::oneshot;

use super::{ConnectingState, State, Transition};
use crate::backoff::BackoffCalculator;
use crate::command::{resolve, Command};
use crate::context::Context;
use crate::error::Error;

/// No transport exists. Commands other than connect fail immediately.
/// When auto-reconnect is armed, ticks eventually chain back into
/// [`ConnectingState`] on an exponential backoff schedule.
pub struct DisconnectedState {
    was_graceful: bool,
    backoff: Option<BackoffCalculator>,
    next_retry_time: Option<Instant>,
}

impl DisconnectedState {
    #[must_use]
    pub fn new(was_graceful: bool) -> Self {
        Self {
            was_graceful,
            backoff: None,
            next_retry_time: None,
        }
    }
}

impl Default for DisconnectedState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl State for DisconnectedState {
    fn name(&self) -> &'static str {
        "Disconnected"
    }

    fn on_enter(&mut self, ctx: &mut Context) -> Transition {
        if ctx.has_socket() {
            ctx.set_socket(None);
        }

        let settings = ctx.settings();
        if settings.auto_reconnect_enabled() && !self.was_graceful {
            let mut backoff = BackoffCalculator::new(
                settings.auto_reconnect_initial_delay_ms(),
                settings.auto_reconnect_max_delay_ms(),
                settings.auto_reconnect_multiplier(),
            );
            let delay = backoff.next_delay();
            log::info!("disconnected: scheduling reconnect in {delay:?}");
            self.next_retry_time = Some(Instant::now() + delay);
            self.backoff = Some(backoff);
        }

        Transition::Stay
    }

    fn handle_command(&mut self, _ctx: &mut Context, command: Command) -> Transition {
        match command {
            Command::Connect {
                clean_session,
                promise,
            } => {
                self.next_retry_time = None;
                self.backoff = None;
                Transition::to(ConnectingState::new(clean_session, promise))
            }
            Command::Publish(cmd) => {
                resolve(cmd.promise, Err(Error::NotConnected));
                Transition::Stay
            }
            Command::Subscribe(cmd) => {
                resolve(cmd.promise, Err(Error::NotConnected));
                Transition::Stay
            }
            Command::Subscribes(cmd) => {
                resolve(cmd.promise, Err(Error::NotConnected));
                Transition::Stay
            }
            Command::Unsubscribes(cmd) => {
                resolve(cmd.promise, Err(Error::NotConnected));
                Transition::Stay
            }
            Command::Disconnect { promise } => {
                resolve(promise, Ok(()));
                Transition::Stay
            }
            Command::CloseSocket => Transition::Stay,
        }
    }

    fn on_socket_disconnected(&mut self, _ctx: &mut Context) -> Transition {
        Transition::Stay
    }

    fn on_data_received(&mut self, _ctx: &mut Context, _data: &[u8]) -> Transition {
        Transition::Stay
    }

    fn on_tick(&mut self, ctx: &mut Context) -> Transition {
        if let Some(retry_time) = self.next_retry_time {
            if Instant::now() >= retry_time {
                // Nobody is awaiting an auto-reconnect, so the promise's
                // receiving half is dropped on the floor.
                let (promise, _receiver) = oneshot::channel();

                let clean_session = ctx.settings().session_expiry_interval() == 0;
                log::info!("disconnected: retrying connect (clean_session={clean_session})");
                return Transition::to(ConnectingState::new(clean_session, promise));
            }
        }

        Transition::Stay
    }
}
