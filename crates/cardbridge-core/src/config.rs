// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RelayMode;

/// The issuer's published mastercard tokenization endpoint, used when the
/// caller does not override it per request.
pub const DEFAULT_TOKENIZATION_ENDPOINT: &str =
    "https://api.pomelo.la/token-provisioning/mastercard/apple-pay";

/// Bounded timeout for the tokenization HTTP call.  The historical plugin
/// enforced none; a stuck issuer left the native sheet open indefinitely.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Tokenization endpoint used when a request carries no override.
    pub default_tokenization_endpoint: String,
    /// Timeout for the tokenization HTTP call, in seconds.
    pub http_timeout_secs: u64,
    /// Whether the engine performs tokenization itself or relays binding
    /// material out to the application layer.
    pub relay_mode: RelayMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_tokenization_endpoint: DEFAULT_TOKENIZATION_ENDPOINT.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            relay_mode: RelayMode::Internal,
        }
    }
}

impl BridgeConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
