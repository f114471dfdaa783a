// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Cardbridge.

use thiserror::Error;

/// Top-level error type for all Cardbridge operations.
///
/// Variants group into the failure classes the calling application needs
/// to tell apart: input validation, device capability, platform
/// construction, tokenization, protocol misuse, and bridge plumbing.
#[derive(Debug, Error)]
pub enum CardBridgeError {
    // -- Input validation --
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {detail}")]
    InvalidField { field: &'static str, detail: String },

    // -- Capability --
    #[error("device cannot add payment passes")]
    DeviceCannotEnroll,

    #[error("wallet library unavailable on this device")]
    WalletUnavailable,

    // -- Construction --
    #[error("cannot create enrollment configuration: {0}")]
    Configuration(String),

    // -- Tokenization --
    #[error("tokenization endpoint returned HTTP {status}")]
    Http { status: u16 },

    #[error("tokenization network error: {0}")]
    Network(String),

    #[error("invalid tokenization response: {0}")]
    InvalidResponse(String),

    #[error("invalid tokenization payload: {0}")]
    InvalidPayload(String),

    // -- Protocol --
    #[error("a provisioning session is already in progress")]
    SessionAlreadyActive,

    #[error("no provisioning session is active")]
    NoActiveSession,

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,

    // -- Plumbing --
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CardBridgeError {
    /// Stable machine-readable reason string for the bridge boundary.
    ///
    /// The calling application branches on these, so they must not change
    /// between releases.
    pub fn reason_code(&self) -> String {
        match self {
            Self::MissingField(field) => format!("missing_{}", snake(field)),
            Self::InvalidField { field, .. } => format!("invalid_{}", snake(field)),
            Self::DeviceCannotEnroll => "device_cannot_add".into(),
            Self::WalletUnavailable => "wallet_unavailable".into(),
            Self::Configuration(_) => "cannot_create_configuration".into(),
            Self::Http { status } => format!("tokenization_http_{status}"),
            Self::Network(_) => "tokenization_network_error".into(),
            Self::InvalidResponse(_) => "invalid_response".into(),
            Self::InvalidPayload(_) => "invalid_payload".into(),
            Self::SessionAlreadyActive => "provisioning_in_progress".into(),
            Self::NoActiveSession => "no_active_session".into(),
            Self::Bridge(_) => "bridge_error".into(),
            Self::PlatformUnavailable => "platform_unavailable".into(),
            Self::Serialization(_) => "serialization_error".into(),
        }
    }
}

/// camelCase bridge field name to snake_case reason fragment.
fn snake(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for ch in field.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CardBridgeError>;
