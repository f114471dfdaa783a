// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One-shot continuation back into the wallet subsystem.
//
// The platform hands the shell a completion callback when it requests
// binding material; that callback must be invoked exactly once — with real
// activation material, or with the inert fallback so the native sheet can
// fail gracefully. Wrapping it here turns "invoked exactly once" from a
// discipline into a type-level guarantee: the handler is consumed on first
// resolve and a second resolve is a logged no-op.

use cardbridge_bridge::traits::PassHandler;
use cardbridge_core::types::ActivationMaterial;

/// Consume-once wrapper around the wallet subsystem's completion callback.
pub struct PassCompletion {
    handler: Option<PassHandler>,
}

impl PassCompletion {
    pub fn new(handler: PassHandler) -> Self {
        Self {
            handler: Some(handler),
        }
    }

    /// Whether the continuation has not been resolved yet.
    pub fn is_armed(&self) -> bool {
        self.handler.is_some()
    }

    /// Resolve the continuation with the given activation material.
    ///
    /// Returns `true` if this call consumed the handler. A second call
    /// cannot re-resolve: it logs a diagnostic and returns `false`.
    pub fn resolve(&mut self, material: ActivationMaterial) -> bool {
        match self.handler.take() {
            Some(handler) => {
                if material.is_inert() {
                    tracing::warn!("resolving wallet continuation with inert request");
                }
                handler(material);
                true
            }
            None => {
                tracing::warn!("wallet continuation already resolved; ignoring");
                false
            }
        }
    }
}

impl std::fmt::Debug for PassCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassCompletion")
            .field("armed", &self.is_armed())
            .finish()
    }
}
