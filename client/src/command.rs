// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use futures::channel::oneshot;

use crate::error::Error;
use crate::message::{Message, SubscribeResult, TopicFilter, UnsubscribeResult};

/// Outcome delivered through a command's promise.
pub type CommandResult<T> = Result<T, Error>;

/// Sending half of a command's promise. Dropping the receiving half is
/// allowed; a failed send is ignored.
pub type ResultSender<T> = oneshot::Sender<CommandResult<T>>;

/// Resolve a promise, ignoring an abandoned receiver.
pub fn resolve<T>(promise: ResultSender<T>, result: CommandResult<T>) {
    let _ = promise.send(result);
}

/// An outbound publish awaiting transmission or acknowledgment.
#[derive(Debug)]
pub struct PublishCommand {
    pub message: Message,
    pub promise: ResultSender<()>,
}

/// A single-filter subscribe awaiting its SUBACK.
#[derive(Debug)]
pub struct SubscribeCommand {
    pub filter: TopicFilter,
    pub promise: ResultSender<SubscribeResult>,
}

/// A multi-filter subscribe awaiting its SUBACK.
#[derive(Debug)]
pub struct SubscribesCommand {
    pub filters: Vec<TopicFilter>,
    pub promise: ResultSender<Vec<SubscribeResult>>,
}

/// An unsubscribe awaiting its UNSUBACK.
#[derive(Debug)]
pub struct UnsubscribesCommand {
    pub topics: Vec<String>,
    pub promise: ResultSender<Vec<UnsubscribeResult>>,
}

/// A user request queued for the reactor thread.
#[derive(Debug)]
pub enum Command {
    Connect {
        clean_session: bool,
        promise: ResultSender<()>,
    },
    Publish(PublishCommand),
    Subscribe(SubscribeCommand),
    Subscribes(SubscribesCommand),
    Unsubscribes(UnsubscribesCommand),
    Disconnect {
        promise: ResultSender<()>,
    },

    /// Internal: force the socket closed while the session is closing.
    CloseSocket,
}
