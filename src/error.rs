// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Crate-level error taxonomy.
//!
//! Each layer keeps its own `thiserror` enum; they converge here so that the
//! terminal can print one short message and tests can match on
//! [`ErrorKind`] without caring which layer failed.

use crate::blockchain::client::RpcError;
use crate::blockchain::signing::SignerError;
use crate::blockchain::types::{Amount, TypeError};
use crate::storage::KeyError;
use crate::terminal::CommandError;

/// Inspectable category of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidKeyFormat,
    SigningFailure,
    RpcError,
    RateLimited,
    UnknownCommand,
    MissingArgument,
    NoWalletAvailable,
    NetworkUnavailable,
    InvalidArgument,
    InvalidResponse,
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("No wallet found. Create one with `wallet new` or provide --from and --key")]
    NoWalletAvailable,

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: Amount, available: u64 },

    #[error("Submission already in flight")]
    SubmissionInFlight,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Key(KeyError::InvalidKeyFormat(_)) => ErrorKind::InvalidKeyFormat,
            ClientError::Key(KeyError::Randomness(_)) => ErrorKind::SigningFailure,
            ClientError::Key(KeyError::Storage(_)) => ErrorKind::Storage,
            ClientError::Signer(SignerError::InvalidKeyFormat(_)) => ErrorKind::InvalidKeyFormat,
            ClientError::Signer(_) => ErrorKind::SigningFailure,
            ClientError::Rpc(RpcError::InvalidRpcUrl(_)) => ErrorKind::InvalidArgument,
            ClientError::Rpc(RpcError::Status { .. }) => ErrorKind::RpcError,
            ClientError::Rpc(RpcError::RateLimited { .. }) => ErrorKind::RateLimited,
            ClientError::Rpc(RpcError::NetworkUnavailable(_)) => ErrorKind::NetworkUnavailable,
            ClientError::Rpc(RpcError::InvalidResponse(_)) => ErrorKind::InvalidResponse,
            ClientError::Command(CommandError::UnknownCommand { .. }) => ErrorKind::UnknownCommand,
            ClientError::Command(CommandError::MissingArgument { .. }) => ErrorKind::MissingArgument,
            ClientError::Command(CommandError::InvalidArgument(_)) => ErrorKind::InvalidArgument,
            ClientError::Type(_) => ErrorKind::InvalidArgument,
            ClientError::NoWalletAvailable => ErrorKind::NoWalletAvailable,
            ClientError::InsufficientBalance { .. } => ErrorKind::InvalidArgument,
            ClientError::SubmissionInFlight => ErrorKind::InvalidArgument,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_source_layer() {
        let cases: Vec<(ClientError, ErrorKind)> = vec![
            (
                KeyError::InvalidKeyFormat("zz".into()).into(),
                ErrorKind::InvalidKeyFormat,
            ),
            (
                SignerError::SigningFailure("bad".into()).into(),
                ErrorKind::SigningFailure,
            ),
            (
                RpcError::Status {
                    status: 400,
                    message: "invalid nonce".into(),
                }
                .into(),
                ErrorKind::RpcError,
            ),
            (
                RpcError::RateLimited {
                    message: "slow down".into(),
                }
                .into(),
                ErrorKind::RateLimited,
            ),
            (
                RpcError::NetworkUnavailable("refused".into()).into(),
                ErrorKind::NetworkUnavailable,
            ),
            (
                CommandError::UnknownCommand {
                    verb: "transfer".into(),
                }
                .into(),
                ErrorKind::UnknownCommand,
            ),
            (ClientError::NoWalletAvailable, ErrorKind::NoWalletAvailable),
            (
                TypeError::InvalidAddress("0x12".into()).into(),
                ErrorKind::InvalidArgument,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }

    #[test]
    fn messages_are_short_and_readable() {
        let err = ClientError::InsufficientBalance {
            required: Amount::Whole(10),
            available: 3,
        };
        assert_eq!(err.to_string(), "Insufficient balance: need 10, have 3");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err: ClientError = RpcError::RateLimited {
            message: "Please wait 1 minute between faucet requests".into(),
        }
        .into();
        assert!(err.to_string().contains("Please wait 1 minute"));
    }
}
