// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardbridge — Native wallet shell abstractions.
//
// This crate defines the traits and platform dispatch for the native wallet
// subsystem. The provisioning engine drives the shell through a unified
// interface; the shell drives the engine back through `EnrollmentDelegate`
// callbacks (binding-material request, finish verdict).

pub mod traits;

#[cfg(target_os = "ios")]
pub mod ios;

#[cfg(target_os = "android")]
pub mod android;

#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub mod stub;

use std::sync::Arc;

/// Retrieves the wallet shell implementation for the target operating system.
pub fn platform_shell() -> Arc<dyn traits::WalletShell> {
    #[cfg(target_os = "ios")]
    {
        // iOS: PassKit through `objc2` message sends.
        Arc::new(ios::IosWalletShell::new())
    }
    #[cfg(target_os = "android")]
    {
        // Android: wallet client through `jni-rs` into the ART runtime.
        Arc::new(android::AndroidWalletShell::new())
    }
    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        // DESKTOP/CI: inert shell so non-native builds and tests run.
        Arc::new(stub::StubShell)
    }
}
