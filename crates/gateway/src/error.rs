// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Unified error codes shared across the HTTP and WebSocket transports.
///
/// Variants map onto the CLIENT/DRIVER/HEALTH/IO/FATAL kinds; the kind itself
/// is not a type, it's a grouping convention reflected in how each variant is
/// surfaced (see [`ErrorCode::http_status`] and the callers of each variant).
///
/// Serializes to and parses from its [`ErrorCode::as_str`] form (e.g.
/// `"SESSION_NOT_FOUND"`) rather than serde's default PascalCase, since this
/// is the wire-level `code` field every client matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // CLIENT
    TooManySessions,
    SessionNotFound,
    Unauthorized,
    AlreadyConnected,
    BadRequest,
    RateLimited,
    InvalidState,
    // DRIVER
    CdpOperationFailed,
    // HEALTH — never reaches the HTTP boundary, included for completeness of Display.
    Unhealthy,
    // IO
    ImportInvalid,
    ImportDecryptFailed,
    ExportFailed,
    // FATAL
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::TooManySessions => 429,
            Self::SessionNotFound => 404,
            Self::Unauthorized => 401,
            Self::AlreadyConnected => 409,
            Self::BadRequest => 400,
            Self::RateLimited => 429,
            Self::InvalidState => 409,
            Self::CdpOperationFailed => 502,
            Self::Unhealthy => 503,
            Self::ImportInvalid => 400,
            Self::ImportDecryptFailed => 400,
            Self::ExportFailed => 500,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooManySessions => "TOO_MANY_SESSIONS",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AlreadyConnected => "ALREADY_CONNECTED",
            Self::BadRequest => "BAD_REQUEST",
            Self::RateLimited => "RATE_LIMITED",
            Self::InvalidState => "INVALID_STATE",
            Self::CdpOperationFailed => "CDP_OPERATION_FAILED",
            Self::Unhealthy => "UNHEALTHY",
            Self::ImportInvalid => "IMPORT_INVALID",
            Self::ImportDecryptFailed => "IMPORT_DECRYPT_FAILED",
            Self::ExportFailed => "EXPORT_FAILED",
            Self::Internal => "INTERNAL",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "TOO_MANY_SESSIONS" => Self::TooManySessions,
            "SESSION_NOT_FOUND" => Self::SessionNotFound,
            "UNAUTHORIZED" => Self::Unauthorized,
            "ALREADY_CONNECTED" => Self::AlreadyConnected,
            "BAD_REQUEST" => Self::BadRequest,
            "RATE_LIMITED" => Self::RateLimited,
            "INVALID_STATE" => Self::InvalidState,
            "CDP_OPERATION_FAILED" => Self::CdpOperationFailed,
            "UNHEALTHY" => Self::Unhealthy,
            "IMPORT_INVALID" => Self::ImportInvalid,
            "IMPORT_DECRYPT_FAILED" => Self::ImportDecryptFailed,
            "EXPORT_FAILED" => Self::ExportFailed,
            "INTERNAL" => Self::Internal,
            _ => return None,
        })
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).ok_or_else(|| de::Error::custom(format!("unknown error code: {s}")))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wire-level error: the flat [`ErrorCode`] plus a free-text message for
/// the HTTP envelope and WebSocket `error`-class messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorBody {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
