// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the native wallet shell.
//
// The shell is the only component allowed to touch the platform wallet
// subsystem. Everything above it (the provisioning engine, the plugin
// dispatch layer) sees these traits and nothing else.

use std::sync::Arc;

use cardbridge_core::error::Result;
use cardbridge_core::types::{
    ActivationMaterial, BindingMaterial, EncryptionScheme, EnrolledCard, FinishVerdict,
    PaymentNetwork, ProvisioningRequest,
};

/// Unified shell grouping the native wallet capabilities.
///
/// Platforms without a wallet subsystem (desktop, CI) supply the stub,
/// which reports incapability from the probe and
/// `CardBridgeError::PlatformUnavailable` from presentation.
pub trait WalletShell: WalletProbeShell + EnrollmentShell + Send + Sync {
    /// Human-readable platform name (e.g. "iOS 17", "Android 14").
    fn platform_name(&self) -> &str;
}

/// Read-only queries over the device wallet.
///
/// These must never mutate wallet state, and incapability is reported
/// through return values rather than errors wherever the platform allows.
pub trait WalletProbeShell {
    /// Whether the wallet/pass library exists on this device at all.
    fn wallet_available(&self) -> bool;

    /// Whether a new payment pass can be enrolled right now.
    fn can_enroll(&self) -> bool;

    /// Snapshot of the payment passes currently in the wallet.
    fn enrolled_cards(&self) -> Result<Vec<EnrolledCard>>;
}

/// One-shot continuation handed to the delegate alongside binding material.
/// Invoking it returns activation material (or the inert fallback) to the
/// wallet subsystem.
pub type PassHandler = Box<dyn FnOnce(ActivationMaterial) + Send>;

/// Callbacks from the native enrollment sheet back into the engine.
///
/// For one presented session the platform guarantees the order: binding
/// material is requested first, the finish verdict arrives last.
pub trait EnrollmentDelegate: Send + Sync {
    /// The wallet subsystem generated device-binding proof and wants
    /// activation material in exchange.  `completion` must be invoked
    /// exactly once — with real material, or with
    /// `ActivationMaterial::inert()` so the sheet can fail gracefully.
    fn binding_material_requested(&self, material: BindingMaterial, completion: PassHandler);

    /// The presented session ended.  Neither pass nor error in the verdict
    /// means the user dismissed the sheet.
    fn enrollment_finished(&self, verdict: FinishVerdict);
}

/// Drives the native enrollment UI.
pub trait EnrollmentShell {
    /// Build the platform enrollment configuration and present the native
    /// sheet.  Implementations own presentation-surface lookup and must
    /// dispatch UI work to whatever execution context the platform
    /// requires.  Returns once presentation is under way; all subsequent
    /// progress flows through the delegate.
    fn present_enrollment(
        &self,
        config: &EnrollmentConfig,
        delegate: Arc<dyn EnrollmentDelegate>,
    ) -> Result<()>;

    /// Tear down any presented enrollment UI.
    fn dismiss_enrollment(&self);
}

/// Parameters for the native enrollment sheet.
#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
    pub cardholder_name: String,
    /// Last four digits shown on the sheet.
    pub primary_account_suffix: String,
    pub localized_description: String,
    pub payment_network: PaymentNetwork,
    pub encryption_scheme: EncryptionScheme,
    /// Issuer identifier used to pre-match the card on the device.
    pub primary_account_identifier: String,
}

impl EnrollmentConfig {
    pub fn from_request(request: &ProvisioningRequest) -> Self {
        Self {
            cardholder_name: request.cardholder_name.clone(),
            primary_account_suffix: request.last4.clone(),
            localized_description: request.localized_description.clone(),
            payment_network: request.payment_network,
            encryption_scheme: request.encryption_scheme,
            primary_account_identifier: request.card_id.clone(),
        }
    }
}
