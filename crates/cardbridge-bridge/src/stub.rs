// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub shell for desktop/CI builds where the native wallet is unavailable.
//
// The probe reports incapability through its return values (the probe
// contract is that it never fails); presenting the enrollment sheet is the
// only operation that errors.

use std::sync::Arc;

use cardbridge_core::error::{CardBridgeError, Result};
use cardbridge_core::types::EnrolledCard;

use crate::traits::*;

/// Inert shell returned on non-mobile platforms.
pub struct StubShell;

impl WalletShell for StubShell {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

impl WalletProbeShell for StubShell {
    fn wallet_available(&self) -> bool {
        false
    }

    fn can_enroll(&self) -> bool {
        false
    }

    fn enrolled_cards(&self) -> Result<Vec<EnrolledCard>> {
        Ok(Vec::new())
    }
}

impl EnrollmentShell for StubShell {
    fn present_enrollment(
        &self,
        _config: &EnrollmentConfig,
        _delegate: Arc<dyn EnrollmentDelegate>,
    ) -> Result<()> {
        tracing::warn!("EnrollmentShell::present_enrollment called on stub shell");
        Err(CardBridgeError::PlatformUnavailable)
    }

    fn dismiss_enrollment(&self) {}
}
