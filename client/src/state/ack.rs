// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Translation of SUBACK/UNSUBACK codes into per-filter results.

use codec::v3::SubscribeAck;
use codec::v5::ReasonCode;

use crate::command::{resolve, SubscribeCommand, SubscribesCommand, UnsubscribesCommand};
use crate::error::Error;
use crate::message::{SubscribeResult, UnsubscribeResult};

/// Version-independent view of a SUBACK's per-filter codes.
pub enum SubAckCodes {
    V3(Vec<SubscribeAck>),
    V5(Vec<ReasonCode>),
}

impl SubAckCodes {
    fn successes(&self) -> Vec<bool> {
        match self {
            // The low two bits of a 3.1.1 return code carry the granted
            // QoS; only 0x80 reports failure.
            Self::V3(codes) => codes.iter().map(|code| !code.is_failed()).collect(),
            Self::V5(codes) => codes
                .iter()
                .map(|code| {
                    matches!(
                        code,
                        ReasonCode::Success
                            | ReasonCode::GrantedQualityOfService1
                            | ReasonCode::GrantedQualityOfService2
                    )
                })
                .collect(),
        }
    }
}

/// Resolve the pending subscribe for a SUBACK. Exactly one of `single` and
/// `multi` should be present for a given packet id.
pub fn resolve_subscription(
    codes: &SubAckCodes,
    single: Option<SubscribeCommand>,
    multi: Option<SubscribesCommand>,
) -> Option<Vec<SubscribeResult>> {
    let successes = codes.successes();

    if let Some(command) = single {
        if successes.is_empty() {
            resolve(command.promise, Err(Error::EmptySubscribeAck));
            return None;
        }
        let result = SubscribeResult {
            filter: command.filter.filter().to_string(),
            success: successes[0],
        };
        resolve(command.promise, Ok(result.clone()));
        return Some(vec![result]);
    }

    if let Some(command) = multi {
        let results: Vec<SubscribeResult> = command
            .filters
            .iter()
            .zip(successes.iter())
            .map(|(filter, success)| SubscribeResult {
                filter: filter.filter().to_string(),
                success: *success,
            })
            .collect();
        resolve(command.promise, Ok(results.clone()));
        return Some(results);
    }

    None
}

/// Resolve the pending unsubscribe for an UNSUBACK. MQTT 3.1.1 carries no
/// per-filter codes, so every topic resolves as success there.
pub fn resolve_unsubscription(
    codes: Option<&[ReasonCode]>,
    command: UnsubscribesCommand,
) -> Vec<UnsubscribeResult> {
    let results: Vec<UnsubscribeResult> = match codes {
        Some(codes) => command
            .topics
            .iter()
            .zip(codes.iter())
            .map(|(topic, code)| UnsubscribeResult {
                topic: topic.clone(),
                success: matches!(code, ReasonCode::Success | ReasonCode::NoSubscriptionExisted),
            })
            .collect(),
        None => command
            .topics
            .iter()
            .map(|topic| UnsubscribeResult {
                topic: topic.clone(),
                success: true,
            })
            .collect(),
    };

    resolve(command.promise, Ok(results.clone()));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TopicFilter;
    use codec::QoS;
    use futures::channel::oneshot;

    #[test]
    fn test_single_subscription_success() {
        let (tx, mut rx) = oneshot::channel();
        let command = SubscribeCommand {
            filter: TopicFilter::new("a/b", QoS::AtLeastOnce),
            promise: tx,
        };
        let codes = SubAckCodes::V5(vec![ReasonCode::GrantedQualityOfService1]);
        resolve_subscription(&codes, Some(command), None);

        let result = rx.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(result.filter, "a/b");
        assert!(result.success);
    }

    #[test]
    fn test_empty_suback_fails_single() {
        let (tx, mut rx) = oneshot::channel();
        let command = SubscribeCommand {
            filter: TopicFilter::new("a", QoS::AtMostOnce),
            promise: tx,
        };
        let codes = SubAckCodes::V5(Vec::new());
        resolve_subscription(&codes, Some(command), None);
        assert_eq!(rx.try_recv().unwrap(), Some(Err(Error::EmptySubscribeAck)));
    }

    #[test]
    fn test_batch_zips_to_shorter_length() {
        let (tx, mut rx) = oneshot::channel();
        let command = SubscribesCommand {
            filters: vec![
                TopicFilter::new("a", QoS::AtLeastOnce),
                TopicFilter::new("b", QoS::ExactOnce),
                TopicFilter::new("c", QoS::AtMostOnce),
            ],
            promise: tx,
        };
        let codes = SubAckCodes::V5(vec![
            ReasonCode::GrantedQualityOfService1,
            ReasonCode::GrantedQualityOfService2,
        ]);
        resolve_subscription(&codes, None, Some(command));

        let results = rx.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn test_batch_mixed_codes() {
        let (tx, mut rx) = oneshot::channel();
        let command = SubscribesCommand {
            filters: vec![
                TopicFilter::new("a", QoS::AtLeastOnce),
                TopicFilter::new("b", QoS::ExactOnce),
                TopicFilter::new("c", QoS::AtMostOnce),
            ],
            promise: tx,
        };
        let codes = SubAckCodes::V5(vec![
            ReasonCode::GrantedQualityOfService1,
            ReasonCode::GrantedQualityOfService2,
            ReasonCode::NotAuthorized,
        ]);
        resolve_subscription(&codes, None, Some(command));

        let results = rx.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(
            results.iter().map(|r| r.success).collect::<Vec<_>>(),
            vec![true, true, false]
        );
    }

    #[test]
    fn test_v311_failure_code() {
        let (tx, mut rx) = oneshot::channel();
        let command = SubscribeCommand {
            filter: TopicFilter::new("x", QoS::AtLeastOnce),
            promise: tx,
        };
        let codes = SubAckCodes::V3(vec![SubscribeAck::Failed]);
        resolve_subscription(&codes, Some(command), None);

        let result = rx.try_recv().unwrap().unwrap().unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_unsubscription_v311_always_succeeds() {
        let (tx, mut rx) = oneshot::channel();
        let command = UnsubscribesCommand {
            topics: vec!["a".to_string(), "b".to_string()],
            promise: tx,
        };
        resolve_unsubscription(None, command);

        let results = rx.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn test_unsubscription_v5_per_filter_codes() {
        let (tx, mut rx) = oneshot::channel();
        let command = UnsubscribesCommand {
            topics: vec!["a".to_string(), "b".to_string()],
            promise: tx,
        };
        resolve_unsubscription(
            Some(&[ReasonCode::Success, ReasonCode::NotAuthorized]),
            command,
        );

        let results = rx.try_recv().unwrap().unwrap().unwrap();
        assert!(results[0].success);
        assert!(!results[1].success);
    }
}
