// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Cardbridge provisioning engine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CardBridgeError, Result};

/// Correlation handle for a single provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub Uuid);

impl SessionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment networks supported by the enrollment sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentNetwork {
    Visa,
    Mastercard,
    Amex,
    Discover,
}

impl PaymentNetwork {
    /// Parse a caller-supplied network name.  Unknown values fall back to
    /// Mastercard, matching the historical plugin behaviour.
    pub fn from_caller(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "visa" => Self::Visa,
            "mastercard" => Self::Mastercard,
            "amex" | "americanexpress" => Self::Amex,
            "discover" => Self::Discover,
            _ => Self::Mastercard,
        }
    }

    /// Canonical lowercase keyword used on the bridge boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visa => "visa",
            Self::Mastercard => "mastercard",
            Self::Amex => "amex",
            Self::Discover => "discover",
        }
    }
}

impl Default for PaymentNetwork {
    fn default() -> Self {
        Self::Mastercard
    }
}

/// Encryption scheme requested from the wallet subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionScheme {
    #[serde(rename = "ECC_V2")]
    EccV2,
    #[serde(rename = "RSA_V2")]
    RsaV2,
}

impl Default for EncryptionScheme {
    fn default() -> Self {
        Self::EccV2
    }
}

fn default_description() -> String {
    "Card".to_string()
}

fn lenient_network<'de, D>(deserializer: D) -> std::result::Result<PaymentNetwork, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|name| PaymentNetwork::from_caller(&name))
        .unwrap_or_default())
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

/// Caller-supplied intent to enroll one card.
///
/// Field names follow the bridge boundary (camelCase); the snake_case
/// aliases accepted by older plugin revisions are preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequest {
    /// Opaque issuer identifier for the card being enrolled.
    ///
    /// The three required fields default to empty so that absence surfaces
    /// through `validate()` as a structured input error rather than a
    /// deserialization failure.
    #[serde(default, alias = "card_id")]
    pub card_id: String,
    #[serde(default)]
    pub cardholder_name: String,
    /// Exactly four digits shown on the enrollment sheet.
    #[serde(default, alias = "lastFourDigits")]
    pub last4: String,
    #[serde(default = "default_description", alias = "description")]
    pub localized_description: String,
    /// Parsed leniently: unknown network names fall back to the default
    /// instead of rejecting the whole request.
    #[serde(default, deserialize_with = "lenient_network")]
    pub payment_network: PaymentNetwork,
    #[serde(default)]
    pub encryption_scheme: EncryptionScheme,
    /// Override for the issuer tokenization endpoint.
    #[serde(default)]
    pub tokenization_endpoint: Option<String>,
    /// Raw `Authorization` header value.  When absent, one is synthesised
    /// from `tokenization_auth_token` and `tokenization_auth_scheme`.
    #[serde(default)]
    pub tokenization_authorization: Option<String>,
    #[serde(default)]
    pub tokenization_auth_token: Option<String>,
    #[serde(default = "default_auth_scheme")]
    pub tokenization_auth_scheme: String,
    /// Additional headers for the tokenization call.  These take precedence
    /// over anything the client sets by default.
    #[serde(default)]
    pub tokenization_headers: HashMap<String, String>,
    #[serde(default, alias = "user_id")]
    pub user_id: Option<String>,
}

impl ProvisioningRequest {
    /// Validate the invariants required before a session may open.
    ///
    /// Absence of `cardId`, `cardholderName`, or a four-digit `last4` is a
    /// terminal input error, never retryable.
    pub fn validate(&self) -> Result<()> {
        if self.card_id.trim().is_empty() {
            return Err(CardBridgeError::MissingField("cardId"));
        }
        if self.cardholder_name.trim().is_empty() {
            return Err(CardBridgeError::MissingField("cardholderName"));
        }
        if self.last4.is_empty() {
            return Err(CardBridgeError::MissingField("last4"));
        }
        if self.last4.len() != 4 || !self.last4.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CardBridgeError::InvalidField {
                field: "last4",
                detail: "expected exactly four digits".into(),
            });
        }
        Ok(())
    }

    /// The `Authorization` header value for the tokenization call, if any.
    pub fn authorization(&self) -> Option<String> {
        if let Some(raw) = &self.tokenization_authorization {
            if !raw.is_empty() {
                return Some(raw.clone());
            }
        }
        match &self.tokenization_auth_token {
            Some(token) if !token.is_empty() => {
                Some(format!("{} {}", self.tokenization_auth_scheme, token))
            }
            _ => None,
        }
    }

    /// The tokenization endpoint, falling back to the configured default.
    pub fn endpoint<'a>(&'a self, default_endpoint: &'a str) -> &'a str {
        match &self.tokenization_endpoint {
            Some(url) if !url.is_empty() => url,
            _ => default_endpoint,
        }
    }
}

/// One card already present in the device wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledCard {
    /// Last four digits of the enrolled card number.
    pub suffix: String,
    pub pass_type_identifier: String,
    pub serial_number: String,
}

/// Read-only snapshot of the device's enrollment capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletProbeResult {
    /// Whether a new card can be enrolled right now.
    pub can_enroll: bool,
    pub has_existing_cards: bool,
    pub library_available: bool,
}

/// Result of a last-four-digits lookup over the enrolled cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardLookup {
    pub exists: bool,
    pub matches: Vec<EnrolledCard>,
    /// Total cards in the wallet, matched or not.
    pub total_cards: usize,
}

/// Device-binding proof generated by the wallet subsystem.
///
/// Certificate order is significant (it is a chain as supplied by the
/// platform) and must be preserved through every encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingMaterial {
    pub certificates: Vec<Vec<u8>>,
    pub nonce: Vec<u8>,
    pub nonce_signature: Vec<u8>,
}

/// Encrypted activation payload returned by the issuer, handed back to the
/// wallet subsystem to finish enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActivationMaterial {
    pub activation_data: Vec<u8>,
    pub encrypted_pass_data: Vec<u8>,
    pub ephemeral_public_key: Vec<u8>,
}

impl ActivationMaterial {
    /// Deliberately empty payload.  Resolving the wallet continuation with
    /// this lets the native sheet fail gracefully instead of hanging when
    /// tokenization has already failed.
    pub fn inert() -> Self {
        Self::default()
    }

    pub fn is_inert(&self) -> bool {
        self.activation_data.is_empty()
            && self.encrypted_pass_data.is_empty()
            && self.ephemeral_public_key.is_empty()
    }

    /// All three fields present and non-empty, as required for the
    /// handshake to succeed.
    pub fn is_complete(&self) -> bool {
        !self.activation_data.is_empty()
            && !self.encrypted_pass_data.is_empty()
            && !self.ephemeral_public_key.is_empty()
    }
}

/// Pass details reported by the wallet subsystem after a successful add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedPassInfo {
    pub pass_type_identifier: String,
    pub serial_number: String,
    pub primary_account_suffix: String,
}

/// What the wallet subsystem reports when a presented session ends.
///
/// Neither a pass nor an error means the user dismissed the sheet.
#[derive(Debug, Clone, Default)]
pub struct FinishVerdict {
    pub pass: Option<AddedPassInfo>,
    pub error: Option<String>,
}

impl FinishVerdict {
    pub fn added(pass: AddedPassInfo) -> Self {
        Self { pass: Some(pass), error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { pass: None, error: Some(message.into()) }
    }

    pub fn cancelled() -> Self {
        Self::default()
    }
}

/// Terminal result of one provisioning attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    Added(AddedPassInfo),
    /// User dismissed the flow.  Distinct from failure.
    Cancelled,
    Failed { reason: String, message: String },
}

impl ProvisioningOutcome {
    pub fn failed_with(err: &CardBridgeError) -> Self {
        Self::Failed {
            reason: err.reason_code(),
            message: err.to_string(),
        }
    }
}

/// How binding material is exchanged for activation material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// The engine calls the tokenization endpoint itself.
    Internal,
    /// Binding material is emitted to the application layer, which calls
    /// the endpoint and completes the session via `complete_activation`.
    External,
}

impl Default for RelayMode {
    fn default() -> Self {
        Self::Internal
    }
}

/// Timestamped record of a session for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub token: SessionToken,
    pub started_at: DateTime<Utc>,
    pub card_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProvisioningRequest {
        serde_json::from_value(serde_json::json!({
            "cardId": "crd-123",
            "cardholderName": "JANE DOE",
            "last4": "4242"
        }))
        .unwrap()
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn missing_card_id_rejected() {
        let mut req = request();
        req.card_id = "".into();
        assert!(matches!(
            req.validate(),
            Err(CardBridgeError::MissingField("cardId"))
        ));
    }

    #[test]
    fn non_digit_last4_rejected() {
        let mut req = request();
        req.last4 = "42a2".into();
        assert!(matches!(
            req.validate(),
            Err(CardBridgeError::InvalidField { field: "last4", .. })
        ));
    }

    #[test]
    fn authorization_synthesised_from_token_and_scheme() {
        let mut req = request();
        req.tokenization_auth_token = Some("abc123".into());
        assert_eq!(req.authorization().as_deref(), Some("Bearer abc123"));

        req.tokenization_authorization = Some("Basic xyz".into());
        assert_eq!(req.authorization().as_deref(), Some("Basic xyz"));
    }

    #[test]
    fn endpoint_falls_back_to_default() {
        let mut req = request();
        assert_eq!(req.endpoint("https://issuer.example/tok"), "https://issuer.example/tok");
        req.tokenization_endpoint = Some("https://override.example".into());
        assert_eq!(req.endpoint("https://issuer.example/tok"), "https://override.example");
    }

    #[test]
    fn unknown_network_defaults_to_mastercard() {
        assert_eq!(PaymentNetwork::from_caller("maestro"), PaymentNetwork::Mastercard);
        assert_eq!(PaymentNetwork::from_caller("VISA"), PaymentNetwork::Visa);
    }

    #[test]
    fn network_is_parsed_leniently_from_requests() {
        let req: ProvisioningRequest = serde_json::from_value(serde_json::json!({
            "cardId": "crd-1",
            "cardholderName": "A B",
            "last4": "1111",
            "paymentNetwork": "AmericanExpress"
        }))
        .unwrap();
        assert_eq!(req.payment_network, PaymentNetwork::Amex);

        let req: ProvisioningRequest = serde_json::from_value(serde_json::json!({
            "cardId": "crd-1",
            "cardholderName": "A B",
            "last4": "1111",
            "paymentNetwork": "something-new"
        }))
        .unwrap();
        assert_eq!(req.payment_network, PaymentNetwork::Mastercard);
    }

    #[test]
    fn snake_case_aliases_accepted() {
        let req: ProvisioningRequest = serde_json::from_value(serde_json::json!({
            "card_id": "crd-9",
            "cardholderName": "A B",
            "lastFourDigits": "1111",
            "user_id": "usr-1"
        }))
        .unwrap();
        assert_eq!(req.card_id, "crd-9");
        assert_eq!(req.last4, "1111");
        assert_eq!(req.user_id.as_deref(), Some("usr-1"));
    }

    #[test]
    fn inert_material_is_not_complete() {
        let inert = ActivationMaterial::inert();
        assert!(inert.is_inert());
        assert!(!inert.is_complete());

        let full = ActivationMaterial {
            activation_data: vec![1],
            encrypted_pass_data: vec![2],
            ephemeral_public_key: vec![3],
        };
        assert!(full.is_complete());
        assert!(!full.is_inert());
    }
}
