// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wallet capability probe and enrolled-card lookup.
//
// Pure queries over the shell: no state is created or mutated, and the
// probe reports incapability through `false` fields rather than failing.

use cardbridge_bridge::traits::WalletShell;
use cardbridge_core::error::Result;
use cardbridge_core::types::{CardLookup, EnrolledCard, WalletProbeResult};

/// Snapshot of the device's enrollment capability.
pub fn probe(shell: &dyn WalletShell) -> WalletProbeResult {
    let library_available = shell.wallet_available();
    let can_enroll = shell.can_enroll();
    let has_existing_cards = shell
        .enrolled_cards()
        .map(|cards| !cards.is_empty())
        .unwrap_or(false);

    tracing::debug!(
        can_enroll,
        has_existing_cards,
        library_available,
        platform = shell.platform_name(),
        "wallet probe"
    );

    WalletProbeResult {
        can_enroll,
        has_existing_cards,
        library_available,
    }
}

/// Look up enrolled cards by exact last-four-digits match.
pub fn find_card(shell: &dyn WalletShell, last4: &str) -> Result<CardLookup> {
    let cards = shell.enrolled_cards()?;
    let matches: Vec<EnrolledCard> = cards
        .iter()
        .filter(|card| card.suffix == last4)
        .cloned()
        .collect();

    Ok(CardLookup {
        exists: !matches.is_empty(),
        total_cards: cards.len(),
        matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeShell;
    use cardbridge_core::types::EnrolledCard;

    fn card(suffix: &str) -> EnrolledCard {
        EnrolledCard {
            suffix: suffix.into(),
            pass_type_identifier: format!("pass.com.example.{suffix}"),
            serial_number: format!("serial-{suffix}"),
        }
    }

    #[test]
    fn probe_reports_incapability_without_failing() {
        let shell = FakeShell::incapable();
        let result = probe(&shell);
        assert!(!result.can_enroll);
        assert!(!result.has_existing_cards);
        assert!(!result.library_available);
    }

    #[test]
    fn probe_sees_existing_cards() {
        let shell = FakeShell::capable().with_cards(vec![card("4242")]);
        let result = probe(&shell);
        assert!(result.can_enroll);
        assert!(result.has_existing_cards);
    }

    #[test]
    fn find_card_matches_exact_suffix_only() {
        let shell = FakeShell::capable().with_cards(vec![card("4242"), card("1111"), card("4242")]);

        let lookup = find_card(&shell, "4242").unwrap();
        assert!(lookup.exists);
        assert_eq!(lookup.matches.len(), 2);
        assert_eq!(lookup.total_cards, 3);

        let lookup = find_card(&shell, "9999").unwrap();
        assert!(!lookup.exists);
        assert!(lookup.matches.is_empty());
        assert_eq!(lookup.total_cards, 3);
    }

    #[test]
    fn find_card_does_not_match_substrings() {
        let shell = FakeShell::capable().with_cards(vec![card("4242")]);
        let lookup = find_card(&shell, "242").unwrap();
        assert!(!lookup.exists);
    }
}
