// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::client::Client;
use crate::command::Command;
use crate::context::Context;
use crate::settings::ConnectionSettings;
use crate::socket::SocketEvent;
use crate::state::{DisconnectedState, State, Transition};

/// The single-threaded engine driving one MQTT session.
///
/// User threads enqueue commands through a [`Client`] handle; a dedicated
/// thread calls [`tick`](Self::tick) in a loop. Each tick drains the
/// command queue into the current state, runs the state's timer hook, then
/// advances the socket and feeds its events back into the state. Any hook
/// may replace the current state; transition chains run to a fixed point
/// before the tick returns.
pub struct Reactor {
    context: Context,
    current_state: Box<dyn State>,
    queue: Arc<Mutex<VecDeque<Command>>>,
}

impl Reactor {
    #[must_use]
    pub fn new(settings: Arc<ConnectionSettings>) -> Self {
        let mut reactor = Self {
            context: Context::new(settings),
            current_state: Box::new(DisconnectedState::default()),
            queue: Arc::new(Mutex::new(VecDeque::new())),
        };
        log::info!(
            "reactor: created (initial state={})",
            reactor.current_state.name()
        );

        let transition = reactor.current_state.on_enter(&mut reactor.context);
        reactor.apply(transition);
        reactor
    }

    /// Get a cheap-clone handle for enqueueing commands from any thread.
    #[must_use]
    pub fn handle(&self) -> Client {
        Client::new(Arc::clone(&self.queue))
    }

    /// Queue a command for the next tick. Safe from any thread.
    ///
    /// # Panics
    ///
    /// Panics if the queue lock is poisoned.
    pub fn enqueue_command(&self, command: Command) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(command);
        log::debug!("reactor: queued command (queue size={})", queue.len());
    }

    /// Access the session context, e.g. to register delegates.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn state_name(&self) -> &'static str {
        self.current_state.name()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.current_state.name() == "Ready"
    }

    /// Run one reactor iteration: commands, timers, then socket I/O.
    ///
    /// # Panics
    ///
    /// Panics if the queue lock is poisoned.
    pub fn tick(&mut self) {
        log::trace!("reactor: tick (state={})", self.current_state.name());

        self.process_command_queue();

        let transition = self.current_state.on_tick(&mut self.context);
        self.apply(transition);

        self.advance_socket();
    }

    fn process_command_queue(&mut self) {
        let mut commands = VecDeque::new();
        {
            let mut queue = self.queue.lock().unwrap();
            std::mem::swap(&mut commands, &mut queue);
        }

        if !commands.is_empty() {
            log::debug!(
                "reactor: processing {} command(s) (state={})",
                commands.len(),
                self.current_state.name()
            );
        }

        for command in commands {
            let transition = self.current_state.handle_command(&mut self.context, command);
            self.apply(transition);
        }
    }

    fn advance_socket(&mut self) {
        let events = match self.context.socket_mut() {
            Some(socket) => socket.tick(),
            None => Vec::new(),
        };

        for event in events {
            match event {
                SocketEvent::Connected(true) => {
                    log::info!(
                        "reactor: socket connected (state={})",
                        self.current_state.name()
                    );
                    let transition = self.current_state.on_socket_connected(&mut self.context);
                    self.apply(transition);
                }
                SocketEvent::Connected(false) => {
                    log::info!(
                        "reactor: socket connect failed (state={})",
                        self.current_state.name()
                    );
                    let transition = self.current_state.on_socket_disconnected(&mut self.context);
                    self.apply(transition);
                }
                SocketEvent::Disconnected => {
                    log::info!(
                        "reactor: socket disconnected (state={})",
                        self.current_state.name()
                    );
                    let expected = matches!(self.current_state.name(), "Closing" | "Disconnected");

                    let transition = self.current_state.on_socket_disconnected(&mut self.context);
                    self.apply(transition);

                    if !expected {
                        let delegate = self.context.on_disconnect().clone();
                        self.context.invoke_callback(move || {
                            delegate.broadcast(&false);
                        });
                    }
                }
                SocketEvent::DataReceived(data) => {
                    log::trace!(
                        "reactor: socket data ({} bytes, state={})",
                        data.len(),
                        self.current_state.name()
                    );
                    let transition = self.current_state.on_data_received(&mut self.context, &data);
                    self.apply(transition);
                }
            }
        }
    }

    fn apply(&mut self, transition: Transition) {
        let Transition::To(mut next) = transition else {
            return;
        };

        loop {
            log::info!(
                "reactor: state {} -> {}",
                self.current_state.name(),
                next.name()
            );

            self.current_state.on_exit(&mut self.context);
            self.current_state = next;

            match self.current_state.on_enter(&mut self.context) {
                Transition::To(chained) => next = chained,
                Transition::Stay => break,
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        log::info!("reactor: dropped (state={})", self.current_state.name());
        self.current_state.on_exit(&mut self.context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::channel::oneshot;

    #[test]
    fn test_starts_disconnected() {
        let reactor = Reactor::new(Arc::new(ConnectionSettings::default()));
        assert_eq!(reactor.state_name(), "Disconnected");
        assert!(!reactor.is_connected());
    }

    #[test]
    fn test_commands_drain_in_order() {
        let mut reactor = Reactor::new(Arc::new(ConnectionSettings::default()));
        let client = reactor.handle();

        let mut receivers = Vec::new();
        for _ in 0..3 {
            receivers.push(client.disconnect());
        }
        reactor.tick();

        for mut rx in receivers {
            assert_eq!(rx.try_recv().unwrap(), Some(Ok(())));
        }
    }

    #[test]
    fn test_connect_without_socket_factory_fails() {
        let mut reactor = Reactor::new(Arc::new(ConnectionSettings::default()));
        let (tx, mut rx) = oneshot::channel();
        reactor.enqueue_command(Command::Connect {
            clean_session: true,
            promise: tx,
        });
        reactor.tick();

        assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::NoSocketFactory)));
        assert_eq!(reactor.state_name(), "Disconnected");
    }
}
