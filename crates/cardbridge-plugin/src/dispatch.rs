// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Action dispatch for the hybrid-app bridge boundary.
//
// The host transport (whatever carries JSON between the web layer and
// native code) delivers `BridgeRequest` values and returns the
// `BridgeResponse`; events travel separately over the plugin event channel.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use cardbridge_core::error::CardBridgeError;
use cardbridge_core::human_errors::humanize_error;
use cardbridge_core::types::{ProvisioningRequest, RelayMode};
use cardbridge_provision::payload::{decode_activation, ActivationMaterialWire};
use cardbridge_provision::ProvisioningEngine;

use crate::events::outcome_payload;

pub const ACTION_CAN_ADD_CARD: &str = "canAddCard";
pub const ACTION_IS_CARD_IN_WALLET: &str = "isCardInWallet";
pub const ACTION_START_PROVISIONING: &str = "startProvisioning";
pub const ACTION_COMPLETE_PROVISIONING: &str = "completeProvisioning";

/// One call arriving over the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeRequest {
    pub action: String,
    #[serde(default)]
    pub args: Value,
}

/// Machine-readable error half of a response.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeError {
    /// Stable reason string the application branches on.
    pub reason: String,
    pub message: String,
    /// Whether retrying the same call can succeed.
    pub retriable: bool,
}

/// Response returned for every bridge call.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BridgeError>,
}

impl BridgeResponse {
    fn success(payload: Value) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    fn failure(err: &CardBridgeError) -> Self {
        let human = humanize_error(err);
        Self {
            ok: false,
            payload: None,
            error: Some(BridgeError {
                reason: err.reason_code(),
                message: err.to_string(),
                retriable: human.retriable,
            }),
        }
    }

    fn rejected(reason: &str, message: String) -> Self {
        Self {
            ok: false,
            payload: None,
            error: Some(BridgeError {
                reason: reason.to_string(),
                message,
                retriable: false,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FindCardArgs {
    #[serde(alias = "lastFourDigits")]
    last4: String,
}

/// Routes bridge actions to the provisioning engine.
pub struct Dispatcher {
    engine: ProvisioningEngine,
}

impl Dispatcher {
    pub fn new(engine: ProvisioningEngine) -> Self {
        Self { engine }
    }

    /// Handle one bridge call.
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        debug!(action = %request.action, "bridge call");
        match request.action.as_str() {
            ACTION_CAN_ADD_CARD => self.can_add_card(),
            ACTION_IS_CARD_IN_WALLET => self.is_card_in_wallet(request.args),
            ACTION_START_PROVISIONING => self.start_provisioning(request.args).await,
            ACTION_COMPLETE_PROVISIONING => self.complete_provisioning(request.args),
            other => {
                warn!(action = other, "unknown bridge action");
                BridgeResponse::rejected("unknown_action", format!("unknown action: {other}"))
            }
        }
    }

    fn can_add_card(&self) -> BridgeResponse {
        let probe = self.engine.probe();
        BridgeResponse::success(json!({
            "canAdd": probe.can_enroll,
            "hasCardsInWallet": probe.has_existing_cards,
            "deviceSupportsWallet": probe.library_available,
        }))
    }

    fn is_card_in_wallet(&self, args: Value) -> BridgeResponse {
        let args: FindCardArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(_) => {
                return BridgeResponse::failure(&CardBridgeError::MissingField("lastFourDigits"))
            }
        };

        match self.engine.find_card(&args.last4) {
            Ok(lookup) => BridgeResponse::success(json!({
                "exists": lookup.exists,
                "lastFourDigits": args.last4,
                "matchedCards": lookup.matches,
                "totalCardsInWallet": lookup.total_cards,
            })),
            Err(e) => BridgeResponse::failure(&e),
        }
    }

    async fn start_provisioning(&self, args: Value) -> BridgeResponse {
        let request: ProvisioningRequest = match serde_json::from_value(args) {
            Ok(request) => request,
            Err(e) => return BridgeResponse::failure(&CardBridgeError::Serialization(e)),
        };

        let handle = match self.engine.start_provisioning(request) {
            Ok(handle) => handle,
            Err(e) => return BridgeResponse::failure(&e),
        };

        match self.engine.relay_mode() {
            // Two-phase mode: acknowledge the start; binding material and
            // the terminal result arrive as events.
            RelayMode::External => BridgeResponse::success(json!({
                "started": true,
                "sessionToken": handle.token,
            })),
            // Single-result mode: hold the call open until the handshake
            // reaches its terminal outcome.
            RelayMode::Internal => match handle.outcome.await {
                Ok(outcome) => BridgeResponse::success(outcome_payload(&outcome)),
                Err(_) => BridgeResponse::failure(&CardBridgeError::Bridge(
                    "session ended without an outcome".into(),
                )),
            },
        }
    }

    fn complete_provisioning(&self, args: Value) -> BridgeResponse {
        let wire: ActivationMaterialWire = match serde_json::from_value(args) {
            Ok(wire) => wire,
            Err(e) => return BridgeResponse::failure(&CardBridgeError::Serialization(e)),
        };

        let material = match decode_activation(&wire) {
            Ok(material) => material,
            Err(e) => {
                // Malformed activation material is terminal for the session;
                // make sure the wallet continuation is not left hanging.
                let response = BridgeResponse::failure(&e);
                self.engine.fail_session(&e);
                return response;
            }
        };

        match self.engine.complete_activation(material) {
            Ok(()) => BridgeResponse::success(json!({ "ok": true })),
            Err(e) => BridgeResponse::failure(&e),
        }
    }
}
