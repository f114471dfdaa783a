// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Event envelope for the host application's event channel.
//
// The host forwards these as document events (or the platform equivalent);
// the payload shapes are part of the bridge contract and must not drift.

use serde_json::{json, Value};

use cardbridge_core::types::ProvisioningOutcome;
use cardbridge_provision::EngineEvent;

/// Fired in external relay mode when the wallet produced binding material.
pub const EVENT_PROVISIONING_DATA_REQUEST: &str = "provisioningDataRequest";
/// Fired once per session with the terminal result.
pub const EVENT_PROVISIONING_RESULT: &str = "provisioningResult";

/// A named event with a JSON payload, ready for the host event channel.
#[derive(Debug, Clone)]
pub struct PluginEvent {
    pub name: &'static str,
    pub payload: Value,
}

impl PluginEvent {
    pub fn from_engine(event: EngineEvent) -> Self {
        match event {
            EngineEvent::BindingMaterialRequested {
                token,
                card_id,
                material,
            } => Self {
                name: EVENT_PROVISIONING_DATA_REQUEST,
                payload: json!({
                    "sessionToken": token,
                    "cardId": card_id,
                    "certificates": material.certificates,
                    "nonce": material.nonce,
                    "nonceSignature": material.nonce_signature,
                }),
            },
            EngineEvent::ProvisioningResult { token, outcome } => {
                let mut payload = outcome_payload(&outcome);
                payload["sessionToken"] = json!(token);
                Self {
                    name: EVENT_PROVISIONING_RESULT,
                    payload,
                }
            }
        }
    }
}

/// Terminal-result payload shared by the result event and the
/// `startProvisioning` response.
pub fn outcome_payload(outcome: &ProvisioningOutcome) -> Value {
    match outcome {
        ProvisioningOutcome::Added(info) => json!({
            "added": true,
            "serialNumber": info.serial_number,
            "passTypeIdentifier": info.pass_type_identifier,
            "primaryAccountSuffix": info.primary_account_suffix,
        }),
        ProvisioningOutcome::Cancelled => json!({
            "added": false,
            "cancelled": true,
            "error": "user_cancelled",
        }),
        ProvisioningOutcome::Failed { reason, message } => json!({
            "added": false,
            "error": reason,
            "message": message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbridge_core::types::{AddedPassInfo, SessionToken};
    use cardbridge_provision::payload::BindingMaterialWire;

    #[test]
    fn data_request_event_carries_base64_fields() {
        let event = PluginEvent::from_engine(EngineEvent::BindingMaterialRequested {
            token: SessionToken::new(),
            card_id: "crd-1".into(),
            material: BindingMaterialWire {
                certificates: vec!["bGVhZg==".into(), "cm9vdA==".into()],
                nonce: "bm9uY2U=".into(),
                nonce_signature: "c2ln".into(),
            },
        });

        assert_eq!(event.name, EVENT_PROVISIONING_DATA_REQUEST);
        assert_eq!(event.payload["cardId"], "crd-1");
        assert_eq!(event.payload["certificates"][0], "bGVhZg==");
        assert_eq!(event.payload["nonceSignature"], "c2ln");
    }

    #[test]
    fn cancelled_outcome_is_not_an_error_result() {
        let payload = outcome_payload(&ProvisioningOutcome::Cancelled);
        assert_eq!(payload["added"], false);
        assert_eq!(payload["cancelled"], true);
        assert_eq!(payload["error"], "user_cancelled");
    }

    #[test]
    fn added_outcome_reports_pass_details() {
        let payload = outcome_payload(&ProvisioningOutcome::Added(AddedPassInfo {
            pass_type_identifier: "pass.com.example".into(),
            serial_number: "serial-1".into(),
            primary_account_suffix: "4242".into(),
        }));
        assert_eq!(payload["added"], true);
        assert_eq!(payload["serialNumber"], "serial-1");
        assert_eq!(payload["passTypeIdentifier"], "pass.com.example");
    }
}
