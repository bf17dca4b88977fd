// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Enhanced authentication exchange during the connect handshake.

use codec::v5::{AuthPacket, ReasonCode};
use codec::ProtocolVersion;

use super::{DisconnectedState, Transition};
use crate::command::{resolve, ResultSender};
use crate::context::Context;
use crate::error::Error;
use crate::wire;

fn fail(promise: &mut Option<ResultSender<()>>, error: Error) -> Transition {
    if let Some(promise) = promise.take() {
        resolve(promise, Err(error));
    }
    Transition::to(DisconnectedState::new(false))
}

/// Answer a broker AUTH challenge, or abort the handshake when the
/// exchange cannot continue.
pub fn handle(
    ctx: &mut Context,
    packet: &AuthPacket,
    promise: &mut Option<ResultSender<()>>,
) -> Transition {
    if ctx.protocol_version() != ProtocolVersion::V5 {
        log::error!("auth: AUTH packet received but protocol is not MQTT 5");
        return fail(promise, Error::AuthNotSupported);
    }

    if packet.reason_code() != ReasonCode::ContinueAuthentication {
        log::error!(
            "auth: AUTH packet with unexpected reason code: {:?}",
            packet.reason_code()
        );
        return fail(promise, Error::AuthenticationFailed);
    }

    let server_data = packet.authentication_data().unwrap_or_default().to_vec();

    let Some(provider) = ctx.settings().credentials_provider().cloned() else {
        log::error!("auth: no credentials provider available for AUTH challenge");
        return fail(promise, Error::NoCredentialsProvider);
    };

    let client_data = provider.on_auth_challenge(&server_data);
    match wire::encode_auth_continue(&client_data) {
        Ok(buf) => {
            ctx.send_packet(&buf);
            Transition::Stay
        }
        Err(err) => {
            log::error!("auth: failed to encode AUTH response: {err:?}");
            fail(promise, Error::EncodingFailed)
        }
    }
}
