// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardbridge Plugin — the hybrid-app bridge boundary.
//
// Wires the platform wallet shell into the provisioning engine and exposes
// the two halves of the bridge contract: request/response action dispatch
// and the outbound event channel.

pub mod dispatch;
pub mod events;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use cardbridge_bridge::traits::WalletShell;
use cardbridge_core::config::BridgeConfig;
use cardbridge_core::error::Result;
use cardbridge_provision::ProvisioningEngine;

pub use dispatch::{BridgeRequest, BridgeResponse, Dispatcher};
pub use events::PluginEvent;

/// The plugin facade the host embeds.
///
/// Cheaply cloneable; all state lives in the engine.
#[derive(Clone)]
pub struct WalletPlugin {
    engine: ProvisioningEngine,
    dispatcher: Arc<Dispatcher>,
}

impl WalletPlugin {
    /// Initialise the plugin against the platform wallet shell.
    ///
    /// Returns the plugin and the event stream the host must forward to
    /// the application layer. Must be called from within a Tokio runtime.
    pub fn init(config: BridgeConfig) -> Result<(Self, mpsc::UnboundedReceiver<PluginEvent>)> {
        Self::with_shell(cardbridge_bridge::platform_shell(), config)
    }

    /// Initialise against an explicit shell (tests, host-supplied shells).
    pub fn with_shell(
        shell: Arc<dyn WalletShell>,
        config: BridgeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PluginEvent>)> {
        let platform = shell.platform_name().to_string();
        let (engine, mut engine_events) = ProvisioningEngine::new(shell, config)?;

        let (events, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = engine_events.recv().await {
                if events.send(PluginEvent::from_engine(event)).is_err() {
                    break;
                }
            }
        });

        info!(platform = %platform, "wallet plugin initialised");
        let dispatcher = Arc::new(Dispatcher::new(engine.clone()));
        Ok((Self { engine, dispatcher }, receiver))
    }

    /// Handle one bridge call.
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        self.dispatcher.handle(request).await
    }

    /// Direct access to the engine for hosts that skip JSON dispatch.
    pub fn engine(&self) -> &ProvisioningEngine {
        &self.engine
    }
}

/// Initialise tracing for hosts that have no subscriber of their own.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
