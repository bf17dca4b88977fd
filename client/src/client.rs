// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;

use crate::command::{
    Command, CommandResult, PublishCommand, SubscribeCommand, SubscribesCommand,
    UnsubscribesCommand,
};
use crate::message::{Message, SubscribeResult, TopicFilter, UnsubscribeResult};

/// Receiving half of an operation's promise.
pub type ResultReceiver<T> = oneshot::Receiver<CommandResult<T>>;

/// Thread-safe handle for submitting operations to a reactor.
///
/// Each method builds a command/promise pair, queues the command for the
/// reactor thread, and returns the future half. The call never blocks on
/// the reactor; awaiting the receiver observes the outcome.
#[derive(Clone)]
pub struct Client {
    queue: Arc<Mutex<VecDeque<Command>>>,
}

impl Client {
    #[must_use]
    pub(crate) fn new(queue: Arc<Mutex<VecDeque<Command>>>) -> Self {
        Self { queue }
    }

    fn enqueue(&self, command: Command) {
        self.queue.lock().unwrap().push_back(command);
    }

    /// Request a session. With `clean_session` the broker discards any
    /// stored state for this client id.
    pub fn connect(&self, clean_session: bool) -> ResultReceiver<()> {
        let (promise, receiver) = oneshot::channel();
        self.enqueue(Command::Connect {
            clean_session,
            promise,
        });
        receiver
    }

    /// Publish a message. `QoS` 0 resolves once written; `QoS` 1/2 resolve
    /// on the terminal acknowledgment.
    pub fn publish(&self, message: Message) -> ResultReceiver<()> {
        let (promise, receiver) = oneshot::channel();
        self.enqueue(Command::Publish(PublishCommand { message, promise }));
        receiver
    }

    /// Subscribe to one topic filter.
    pub fn subscribe(&self, filter: TopicFilter) -> ResultReceiver<SubscribeResult> {
        let (promise, receiver) = oneshot::channel();
        self.enqueue(Command::Subscribe(SubscribeCommand { filter, promise }));
        receiver
    }

    /// Subscribe to a batch of topic filters with one packet.
    pub fn subscribe_many(&self, filters: Vec<TopicFilter>) -> ResultReceiver<Vec<SubscribeResult>> {
        let (promise, receiver) = oneshot::channel();
        self.enqueue(Command::Subscribes(SubscribesCommand { filters, promise }));
        receiver
    }

    /// Remove the subscription for one topic filter.
    pub fn unsubscribe(&self, topic: &str) -> ResultReceiver<Vec<UnsubscribeResult>> {
        self.unsubscribe_many(vec![topic.to_string()])
    }

    /// Remove subscriptions for a batch of topic filters with one packet.
    pub fn unsubscribe_many(&self, topics: Vec<String>) -> ResultReceiver<Vec<UnsubscribeResult>> {
        let (promise, receiver) = oneshot::channel();
        self.enqueue(Command::Unsubscribes(UnsubscribesCommand { topics, promise }));
        receiver
    }

    /// Close the session gracefully. Resolves once the close completes.
    pub fn disconnect(&self) -> ResultReceiver<()> {
        let (promise, receiver) = oneshot::channel();
        self.enqueue(Command::Disconnect { promise });
        receiver
    }
}
