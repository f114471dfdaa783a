// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire forms for the binding-material and activation-material payloads.
//
// Every binary field crossing a boundary — the bridge event channel or the
// tokenization HTTP call — is standard base64. Certificate chain order is
// significant and preserved through every encode/decode.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use cardbridge_core::error::{CardBridgeError, Result};
use cardbridge_core::types::{ActivationMaterial, BindingMaterial};

/// Binding material as it travels over the bridge event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingMaterialWire {
    pub certificates: Vec<String>,
    pub nonce: String,
    pub nonce_signature: String,
}

/// Encode binding material for the bridge boundary.
pub fn encode_binding_material(material: &BindingMaterial) -> BindingMaterialWire {
    BindingMaterialWire {
        certificates: material
            .certificates
            .iter()
            .map(|cert| BASE64.encode(cert))
            .collect(),
        nonce: BASE64.encode(&material.nonce),
        nonce_signature: BASE64.encode(&material.nonce_signature),
    }
}

/// Decode binding material received over the bridge boundary.
pub fn decode_binding_material(wire: &BindingMaterialWire) -> Result<BindingMaterial> {
    let certificates = wire
        .certificates
        .iter()
        .map(|cert| decode_field("certificates", cert))
        .collect::<Result<Vec<_>>>()?;
    Ok(BindingMaterial {
        certificates,
        nonce: decode_field("nonce", &wire.nonce)?,
        nonce_signature: decode_field("nonce_signature", &wire.nonce_signature)?,
    })
}

/// JSON body POSTed to the issuer tokenization endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizeRequestBody {
    pub card_id: String,
    pub certificates: Vec<String>,
    pub nonce: String,
    pub nonce_signature: String,
    /// Included only when present and non-empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TokenizeRequestBody {
    pub fn new(card_id: &str, user_id: Option<&str>, material: &BindingMaterial) -> Self {
        let wire = encode_binding_material(material);
        Self {
            card_id: card_id.to_string(),
            certificates: wire.certificates,
            nonce: wire.nonce,
            nonce_signature: wire.nonce_signature,
            user_id: user_id.filter(|id| !id.is_empty()).map(str::to_string),
        }
    }
}

/// Top-level issuer response: `{"data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenizeResponseBody {
    pub data: ActivationMaterialWire,
}

/// Activation material as base64 text.
///
/// The issuer responds in snake_case; the camelCase aliases accept the
/// same shape from the bridge boundary's `completeProvisioning` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivationMaterialWire {
    #[serde(default, alias = "activationData")]
    pub activation_data: Option<String>,
    #[serde(default, alias = "encryptedPassData")]
    pub encrypted_pass_data: Option<String>,
    #[serde(default, alias = "ephemeralPublicKey")]
    pub ephemeral_public_key: Option<String>,
}

/// Encode activation material for the wire.
pub fn encode_activation(material: &ActivationMaterial) -> ActivationMaterialWire {
    ActivationMaterialWire {
        activation_data: Some(BASE64.encode(&material.activation_data)),
        encrypted_pass_data: Some(BASE64.encode(&material.encrypted_pass_data)),
        ephemeral_public_key: Some(BASE64.encode(&material.ephemeral_public_key)),
    }
}

/// Decode activation material, requiring all three fields present and
/// non-empty. Any absence or base64 failure is a terminal payload error
/// for the session.
pub fn decode_activation(wire: &ActivationMaterialWire) -> Result<ActivationMaterial> {
    let material = ActivationMaterial {
        activation_data: decode_required("activation_data", wire.activation_data.as_deref())?,
        encrypted_pass_data: decode_required(
            "encrypted_pass_data",
            wire.encrypted_pass_data.as_deref(),
        )?,
        ephemeral_public_key: decode_required(
            "ephemeral_public_key",
            wire.ephemeral_public_key.as_deref(),
        )?,
    };
    Ok(material)
}

fn decode_required(field: &'static str, value: Option<&str>) -> Result<Vec<u8>> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or(CardBridgeError::InvalidPayload(format!("missing {field}")))?;
    let bytes = decode_field(field, value)?;
    if bytes.is_empty() {
        return Err(CardBridgeError::InvalidPayload(format!("empty {field}")));
    }
    Ok(bytes)
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| CardBridgeError::InvalidPayload(format!("bad base64 in {field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(cert_count: usize) -> BindingMaterial {
        BindingMaterial {
            certificates: (0..cert_count)
                .map(|i| vec![i as u8, 0xAB, 0xCD, i as u8])
                .collect(),
            nonce: vec![0x01, 0x02, 0x03],
            nonce_signature: vec![0xFF, 0xFE],
        }
    }

    #[test]
    fn binding_material_round_trips() {
        for count in [0, 1, 3] {
            let original = material(count);
            let wire = encode_binding_material(&original);
            let decoded = decode_binding_material(&wire).unwrap();
            assert_eq!(decoded, original, "round trip with {count} certificates");
        }
    }

    #[test]
    fn certificate_order_is_preserved() {
        let original = BindingMaterial {
            certificates: vec![b"leaf".to_vec(), b"intermediate".to_vec(), b"root".to_vec()],
            nonce: vec![1],
            nonce_signature: vec![2],
        };
        let decoded = decode_binding_material(&encode_binding_material(&original)).unwrap();
        assert_eq!(decoded.certificates[0], b"leaf");
        assert_eq!(decoded.certificates[2], b"root");
    }

    #[test]
    fn bad_base64_in_binding_material_is_rejected() {
        let wire = BindingMaterialWire {
            certificates: vec!["%%%not-base64%%%".into()],
            nonce: BASE64.encode([1u8]),
            nonce_signature: BASE64.encode([2u8]),
        };
        assert!(matches!(
            decode_binding_material(&wire),
            Err(CardBridgeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn user_id_omitted_when_absent() {
        let body = TokenizeRequestBody::new("crd-1", None, &material(1));
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("user_id").is_none());
        assert_eq!(json["card_id"], "crd-1");

        let body = TokenizeRequestBody::new("crd-1", Some(""), &material(1));
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("user_id").is_none());

        let body = TokenizeRequestBody::new("crd-1", Some("usr-7"), &material(1));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["user_id"], "usr-7");
    }

    #[test]
    fn activation_round_trips() {
        let original = ActivationMaterial {
            activation_data: b"activation".to_vec(),
            encrypted_pass_data: b"pass-data".to_vec(),
            ephemeral_public_key: b"pubkey".to_vec(),
        };
        let decoded = decode_activation(&encode_activation(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn missing_encrypted_pass_data_is_invalid_payload() {
        let mut wire = encode_activation(&ActivationMaterial {
            activation_data: b"a".to_vec(),
            encrypted_pass_data: b"b".to_vec(),
            ephemeral_public_key: b"c".to_vec(),
        });
        wire.encrypted_pass_data = None;
        match decode_activation(&wire) {
            Err(CardBridgeError::InvalidPayload(detail)) => {
                assert!(detail.contains("encrypted_pass_data"));
            }
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn camel_case_aliases_accepted_from_bridge() {
        let wire: ActivationMaterialWire = serde_json::from_value(serde_json::json!({
            "activationData": BASE64.encode(b"a"),
            "encryptedPassData": BASE64.encode(b"b"),
            "ephemeralPublicKey": BASE64.encode(b"c"),
        }))
        .unwrap();
        let decoded = decode_activation(&wire).unwrap();
        assert_eq!(decoded.activation_data, b"a");
    }

    #[test]
    fn issuer_response_shape_parses() {
        let body: TokenizeResponseBody = serde_json::from_value(serde_json::json!({
            "data": {
                "activation_data": BASE64.encode(b"act"),
                "encrypted_pass_data": BASE64.encode(b"enc"),
                "ephemeral_public_key": BASE64.encode(b"key"),
            }
        }))
        .unwrap();
        let material = decode_activation(&body.data).unwrap();
        assert_eq!(material.ephemeral_public_key, b"key");
    }
}
