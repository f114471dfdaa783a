// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the host application.
//
// Every technical error maps to plain English with a clear suggestion, plus
// a severity that tells the app whether to retry (tokenization), fix input
// (validation), or hide the feature entirely (capability).

use crate::error::CardBridgeError;

/// Severity of an error from the host application's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip, timeout — worth retrying.
    Transient,
    /// The caller must change something (input, credentials) first.
    ActionRequired,
    /// Cannot be fixed by retrying — device incapable, protocol misuse.
    Permanent,
}

/// A human-readable error with a plain English message and suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the caller should try (shown as body text).
    pub suggestion: String,
    /// Whether retrying the same call can succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `CardBridgeError` into a `HumanError` for display.
pub fn humanize_error(err: &CardBridgeError) -> HumanError {
    match err {
        // -- Input validation --
        CardBridgeError::MissingField(field) => HumanError {
            message: "Some card details are missing.".into(),
            suggestion: format!("Provide a value for '{field}' and try again."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        CardBridgeError::InvalidField { field, detail } => HumanError {
            message: "One of the card details looks wrong.".into(),
            suggestion: format!("Check '{field}': {detail}."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Capability --
        CardBridgeError::DeviceCannotEnroll => HumanError {
            message: "This device can't add cards to its wallet.".into(),
            suggestion: "Hide the add-to-wallet button, or ask the user to check their wallet settings and restrictions.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        CardBridgeError::WalletUnavailable => HumanError {
            message: "The wallet isn't available on this device.".into(),
            suggestion: "Hide the add-to-wallet feature on this device.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Construction --
        CardBridgeError::Configuration(detail) => HumanError {
            message: "The wallet couldn't start the enrollment screen.".into(),
            suggestion: format!("This usually points to bad card parameters. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Tokenization --
        CardBridgeError::Http { status } => HumanError {
            message: "The card issuer's service rejected the request.".into(),
            suggestion: format!("The issuer returned HTTP {status}. Try again in a moment; if it keeps failing, check the credentials sent with the request."),
            retriable: true,
            severity: Severity::Transient,
        },

        CardBridgeError::Network(detail) => HumanError {
            message: "We couldn't reach the card issuer's service.".into(),
            suggestion: format!("Check the network connection and try again. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        CardBridgeError::InvalidResponse(_) => HumanError {
            message: "The card issuer's service sent an unexpected reply.".into(),
            suggestion: "Try again. If it keeps happening, the issuer integration may have changed.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        CardBridgeError::InvalidPayload(_) => HumanError {
            message: "The card issuer's reply was incomplete.".into(),
            suggestion: "Try again. If it keeps happening, the issuer integration may have changed.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        // -- Protocol --
        CardBridgeError::SessionAlreadyActive => HumanError {
            message: "A card is already being added.".into(),
            suggestion: "Wait for the current enrollment to finish before starting another.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        CardBridgeError::NoActiveSession => HumanError {
            message: "There's no card enrollment in progress.".into(),
            suggestion: "Start the enrollment before completing it.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Platform bridge --
        CardBridgeError::Bridge(detail) => HumanError {
            message: "Something went wrong talking to the device.".into(),
            suggestion: format!("Try again. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        CardBridgeError::PlatformUnavailable => HumanError {
            message: "This feature isn't available on this platform.".into(),
            suggestion: "Hide the add-to-wallet feature on this platform.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Plumbing --
        CardBridgeError::Serialization(_) => HumanError {
            message: "The request couldn't be read.".into(),
            suggestion: "Check that the call arguments are well-formed JSON.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenization_errors_are_retriable() {
        let err = CardBridgeError::Http { status: 503 };
        let human = humanize_error(&err);
        assert!(human.retriable);
        assert_eq!(human.severity, Severity::Transient);
    }

    #[test]
    fn validation_errors_require_action() {
        let err = CardBridgeError::MissingField("cardId");
        let human = humanize_error(&err);
        assert!(!human.retriable);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.suggestion.contains("cardId"));
    }

    #[test]
    fn capability_errors_are_permanent() {
        let human = humanize_error(&CardBridgeError::DeviceCannotEnroll);
        assert_eq!(human.severity, Severity::Permanent);
    }
}
