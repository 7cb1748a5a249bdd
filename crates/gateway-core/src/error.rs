// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway-wide error kinds.
//!
//! Mirrors the semantic error taxonomy of the node runtime rather than
//! any single transport's status codes; every fallible core API returns
//! `Result<T, GatewayError>`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic error kind carried in `RESP_ERROR` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Success,
    ParamIsWrong,
    BodyIsWrong,
    IpAddressInvalid,
    IpAddressInUse,
    NodeSettingInvalid,
    NodeExist,
    NodeNotExist,
    GroupNotExist,
    GroupMaxGroups,
    GroupAlreadySubscribed,
    GroupNotSubscribe,
    GroupNotAllow,
    LibraryNameConflict,
    LibraryNotFound,
    LibraryModuleAlreadyExist,
    LibraryModuleNotExists,
    NodeNotAllowDelete,
    NodeNotAllowSubscribe,
    LibrarySystemNotAllowDel,
    LibraryInUse,
    LibraryNotAllowCreateInstance,
    PluginTypeNotSupport,
    LibraryFailedToOpen,
    LibraryModuleInvalid,
    LibraryModuleVersionNotMatch,
    LibraryModuleKindNotSupport,
    LibraryArchNotSupport,
    LibraryClibNotMatch,
    LibraryNameNotConform,
    LibraryAddFail,
    LibraryUpdateFail,
    PluginDisconnected,
    PluginDeviceNotResponse,
    PluginProtocolDecodeFailure,
    PluginReadFailure,
    PluginTagNotAllowWrite,
    MqttSubscribeFailure,
    Internal,
}

/// Top-level error type returned by the core registries and bus.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0:?}")]
    Kind(ErrorKind),

    #[error("node {0:?} not found")]
    NodeNotFound(String),

    #[error("plugin module {0:?} not found")]
    PluginNotFound(String),

    #[error("driver {driver:?} has no group {group:?}")]
    GroupNotFound { driver: String, group: String },

    #[error("subscription ({driver:?}, {group:?}, {app:?}) already exists")]
    AlreadySubscribed {
        driver: String,
        group: String,
        app: String,
    },

    #[error("subscription ({driver:?}, {group:?}, {app:?}) does not exist")]
    NotSubscribed {
        driver: String,
        group: String,
        app: String,
    },

    #[error("name conflict: {0:?}")]
    NameConflict(String),

    #[error("node name conflict: {0:?}")]
    NodeNameConflict(String),

    #[error("node {0:?} is static or single and cannot be removed")]
    NotAllowedToDelete(String),

    #[error("bus error: {0}")]
    Bus(#[from] crate::bus::BusError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Kind(k) => *k,
            GatewayError::NodeNotFound(_) => ErrorKind::NodeNotExist,
            GatewayError::PluginNotFound(_) => ErrorKind::LibraryNotFound,
            GatewayError::GroupNotFound { .. } => ErrorKind::GroupNotExist,
            GatewayError::AlreadySubscribed { .. } => ErrorKind::GroupAlreadySubscribed,
            GatewayError::NotSubscribed { .. } => ErrorKind::GroupNotSubscribe,
            GatewayError::NameConflict(_) => ErrorKind::LibraryNameConflict,
            GatewayError::NodeNameConflict(_) => ErrorKind::NodeExist,
            GatewayError::NotAllowedToDelete(_) => ErrorKind::NodeNotAllowDelete,
            GatewayError::Bus(_) => ErrorKind::Internal,
            GatewayError::Io(_) => ErrorKind::Internal,
        }
    }
}
