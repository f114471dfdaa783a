// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The provisioning session state machine.
//
// One engine holds at most one in-flight session. The wallet shell drives
// it through the delegate callbacks (binding-material request, finish
// verdict); the application layer drives it through `start_provisioning`
// and, in external relay mode, `complete_activation`. Every failure after
// the sheet is on screen resolves the wallet continuation with an inert
// request — the native UI must be able to close itself.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use cardbridge_bridge::traits::{
    EnrollmentConfig, EnrollmentDelegate, PassHandler, WalletShell,
};
use cardbridge_core::config::BridgeConfig;
use cardbridge_core::error::{CardBridgeError, Result};
use cardbridge_core::types::{
    ActivationMaterial, BindingMaterial, CardLookup, FinishVerdict, ProvisioningOutcome,
    ProvisioningRequest, RelayMode, SessionInfo, SessionToken, WalletProbeResult,
};

use crate::completion::PassCompletion;
use crate::payload::{encode_binding_material, BindingMaterialWire, TokenizeRequestBody};
use crate::probe;
use crate::tokenize::TokenizationClient;

/// Events emitted by the engine for the plugin boundary.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// External relay mode: the wallet produced binding material and the
    /// application layer must perform tokenization, then call
    /// `complete_activation`.
    BindingMaterialRequested {
        token: SessionToken,
        card_id: String,
        material: BindingMaterialWire,
    },
    /// Terminal result of a session, success or not.
    ProvisioningResult {
        token: SessionToken,
        outcome: ProvisioningOutcome,
    },
}

/// Handle returned by `start_provisioning`: the correlation token plus a
/// receiver resolved exactly once with the terminal outcome.
#[derive(Debug)]
pub struct SessionHandle {
    pub token: SessionToken,
    pub outcome: oneshot::Receiver<ProvisioningOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Sheet presented; waiting for the wallet to request binding material.
    AwaitingBindingMaterial,
    /// Binding material relayed; waiting for activation material.
    AwaitingActivation,
}

/// The single in-flight handshake.
struct ProvisioningSession {
    token: SessionToken,
    request: ProvisioningRequest,
    state: SessionState,
    started_at: DateTime<Utc>,
    /// The wallet continuation, captured when binding material arrives and
    /// consumed exactly once.
    completion: Option<PassCompletion>,
    /// Resolves the caller's `SessionHandle`.
    responder: Option<oneshot::Sender<ProvisioningOutcome>>,
}

struct EngineInner {
    shell: Arc<dyn WalletShell>,
    tokenizer: TokenizationClient,
    config: BridgeConfig,
    session: Mutex<Option<ProvisioningSession>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

/// The provisioning engine.
///
/// Cheaply cloneable (all state behind an `Arc`) so it can be handed to
/// the shell as a delegate and moved into the spawned tokenization task.
#[derive(Clone)]
pub struct ProvisioningEngine {
    inner: Arc<EngineInner>,
}

impl ProvisioningEngine {
    /// Build an engine over the given shell.
    ///
    /// Returns the engine and the receiving end of its event channel.
    pub fn new(
        shell: Arc<dyn WalletShell>,
        config: BridgeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
        let tokenizer = TokenizationClient::new(config.http_timeout())?;
        let (events, receiver) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Arc::new(EngineInner {
                shell,
                tokenizer,
                config,
                session: Mutex::new(None),
                events,
            }),
        };
        Ok((engine, receiver))
    }

    /// How this engine relays binding material (see [`RelayMode`]).
    pub fn relay_mode(&self) -> RelayMode {
        self.inner.config.relay_mode
    }

    /// Snapshot of the device's enrollment capability.
    pub fn probe(&self) -> WalletProbeResult {
        probe::probe(self.inner.shell.as_ref())
    }

    /// Look up enrolled cards by exact last-four-digits match.
    pub fn find_card(&self, last4: &str) -> Result<CardLookup> {
        probe::find_card(self.inner.shell.as_ref(), last4)
    }

    /// The session currently in flight, if any.
    pub fn active_session(&self) -> Option<SessionInfo> {
        self.inner
            .session
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .map(|session| SessionInfo {
                token: session.token,
                started_at: session.started_at,
                card_id: session.request.card_id.clone(),
            })
    }

    /// Open a provisioning session and present the enrollment sheet.
    ///
    /// Validation and capability failures never create a session; a second
    /// start while one is open is rejected without touching the first.
    pub fn start_provisioning(&self, request: ProvisioningRequest) -> Result<SessionHandle> {
        request.validate()?;

        if !self.inner.shell.can_enroll() {
            return Err(CardBridgeError::DeviceCannotEnroll);
        }

        let token = SessionToken::new();
        let (responder, outcome) = oneshot::channel();
        {
            let mut guard = self.inner.session.lock().expect("session lock poisoned");
            if let Some(open) = guard.as_ref() {
                warn!(open = %open.token, "rejecting start while a session is in progress");
                return Err(CardBridgeError::SessionAlreadyActive);
            }
            *guard = Some(ProvisioningSession {
                token,
                request: request.clone(),
                state: SessionState::AwaitingBindingMaterial,
                started_at: Utc::now(),
                completion: None,
                responder: Some(responder),
            });
        }

        let config = EnrollmentConfig::from_request(&request);
        let delegate: Arc<dyn EnrollmentDelegate> = Arc::new(self.clone());
        if let Err(e) = self.inner.shell.present_enrollment(&config, delegate) {
            // Presentation never started; tear the session back down unless
            // a callback already replaced it.
            let mut guard = self.inner.session.lock().expect("session lock poisoned");
            if guard.as_ref().map(|s| s.token) == Some(token) {
                *guard = None;
            }
            return Err(e);
        }

        info!(%token, card_id = %request.card_id, "provisioning session opened");
        Ok(SessionHandle { token, outcome })
    }

    /// Resolve the pending wallet continuation with activation material.
    ///
    /// External-relay callers land here after their own tokenization call;
    /// the internal relay joins through the same path. Incomplete material
    /// fails the session (inert-resolving the continuation) rather than
    /// handing the wallet a half-empty request.
    pub fn complete_activation(&self, material: ActivationMaterial) -> Result<()> {
        if !material.is_complete() {
            let err = CardBridgeError::InvalidPayload("activation material incomplete".into());
            self.fail_session(&err);
            return Err(err);
        }

        // Take the continuation out under the lock, resolve it outside: the
        // handler is foreign code and must not run with the lock held.
        let (token, mut completion) = {
            let mut guard = self.inner.session.lock().expect("session lock poisoned");
            let session = guard.as_mut().ok_or(CardBridgeError::NoActiveSession)?;
            match session.completion.take() {
                Some(completion) => (session.token, completion),
                None => {
                    warn!(token = %session.token, "no pending continuation to complete");
                    return Err(CardBridgeError::NoActiveSession);
                }
            }
        };

        completion.resolve(material);
        debug!(%token, "activation material relayed to wallet");
        Ok(())
    }

    /// Close the session with a failure: inert-resolve any pending wallet
    /// continuation and deliver the error outcome.
    ///
    /// The boundary also calls this when externally-supplied activation
    /// material cannot even be decoded — the native sheet must not be left
    /// hanging on a continuation nobody will resolve.
    pub fn fail_session(&self, err: &CardBridgeError) {
        let session = self
            .inner
            .session
            .lock()
            .expect("session lock poisoned")
            .take();

        let Some(mut session) = session else {
            warn!("failure with no open session: {err}");
            return;
        };

        if let Some(mut completion) = session.completion.take() {
            completion.resolve(ActivationMaterial::inert());
        }

        let outcome = ProvisioningOutcome::failed_with(err);
        warn!(token = %session.token, reason = %err.reason_code(), "session failed");
        self.deliver(session, outcome);
    }

    fn deliver(&self, mut session: ProvisioningSession, outcome: ProvisioningOutcome) {
        if let Some(responder) = session.responder.take() {
            let _ = responder.send(outcome.clone());
        }
        self.emit(EngineEvent::ProvisioningResult {
            token: session.token,
            outcome,
        });
    }

    fn emit(&self, event: EngineEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    fn relay_internal(&self, token: SessionToken, request: ProvisioningRequest, material: BindingMaterial) {
        let engine = self.clone();
        tokio::spawn(async move {
            let body = TokenizeRequestBody::new(
                &request.card_id,
                request.user_id.as_deref(),
                &material,
            );
            let endpoint = request
                .endpoint(&engine.inner.config.default_tokenization_endpoint)
                .to_string();
            let authorization = request.authorization();

            match engine
                .inner
                .tokenizer
                .tokenize(
                    &endpoint,
                    authorization.as_deref(),
                    &request.tokenization_headers,
                    &body,
                )
                .await
            {
                Ok(material) => {
                    if let Err(e) = engine.complete_activation(material) {
                        warn!(%token, "could not relay activation material: {e}");
                    }
                }
                Err(e) => engine.fail_session(&e),
            }
        });
    }
}

impl EnrollmentDelegate for ProvisioningEngine {
    fn binding_material_requested(&self, material: BindingMaterial, completion: PassHandler) {
        let mut completion = Some(PassCompletion::new(completion));

        // Decide under the lock, resolve outside it: the continuation wraps
        // foreign code.
        let captured = {
            let mut guard = self.inner.session.lock().expect("session lock poisoned");
            match guard.as_mut() {
                None => {
                    // No caller to report to; let the sheet close itself.
                    warn!("binding material arrived with no open session; dropping");
                    None
                }
                Some(session) if session.state != SessionState::AwaitingBindingMaterial => {
                    warn!(
                        token = %session.token,
                        "binding material arrived out of order; dropping"
                    );
                    None
                }
                Some(session) => {
                    session.state = SessionState::AwaitingActivation;
                    session.completion = completion.take();
                    Some((session.token, session.request.clone()))
                }
            }
        };

        let Some((token, request)) = captured else {
            if let Some(mut completion) = completion.take() {
                completion.resolve(ActivationMaterial::inert());
            }
            return;
        };

        debug!(
            %token,
            certificates = material.certificates.len(),
            "binding material captured"
        );

        match self.inner.config.relay_mode {
            RelayMode::Internal => self.relay_internal(token, request, material),
            RelayMode::External => self.emit(EngineEvent::BindingMaterialRequested {
                token,
                card_id: request.card_id,
                material: encode_binding_material(&material),
            }),
        }
    }

    fn enrollment_finished(&self, verdict: FinishVerdict) {
        let session = self
            .inner
            .session
            .lock()
            .expect("session lock poisoned")
            .take();

        let Some(mut session) = session else {
            // Already closed (e.g. tokenization failed first); the sheet's
            // own verdict has nowhere to go.
            debug!("finish verdict with no open session; ignoring");
            return;
        };

        // The sheet can close before ever requesting binding material; the
        // continuation, if captured, dies with the session.
        if session.completion.take().is_some() {
            debug!(token = %session.token, "releasing unused wallet continuation");
        }

        let outcome = if let Some(message) = verdict.error {
            ProvisioningOutcome::Failed {
                reason: "provisioning_failed".into(),
                message,
            }
        } else if let Some(pass) = verdict.pass {
            ProvisioningOutcome::Added(pass)
        } else {
            ProvisioningOutcome::Cancelled
        };

        info!(token = %session.token, ?outcome, "provisioning session closed");
        self.deliver(session, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decode_binding_material;
    use crate::testutil::{activation_json, serve_once, FakeShell};
    use cardbridge_core::types::AddedPassInfo;

    fn request() -> ProvisioningRequest {
        serde_json::from_value(serde_json::json!({
            "cardId": "crd-123",
            "cardholderName": "JANE DOE",
            "last4": "4242"
        }))
        .unwrap()
    }

    fn material() -> BindingMaterial {
        BindingMaterial {
            certificates: vec![b"leaf".to_vec(), b"root".to_vec()],
            nonce: b"nonce".to_vec(),
            nonce_signature: b"sig".to_vec(),
        }
    }

    fn activation() -> ActivationMaterial {
        ActivationMaterial {
            activation_data: b"act".to_vec(),
            encrypted_pass_data: b"enc".to_vec(),
            ephemeral_public_key: b"key".to_vec(),
        }
    }

    fn pass_info() -> AddedPassInfo {
        AddedPassInfo {
            pass_type_identifier: "pass.com.example".into(),
            serial_number: "serial-1".into(),
            primary_account_suffix: "4242".into(),
        }
    }

    fn external_engine(
        shell: Arc<FakeShell>,
    ) -> (ProvisioningEngine, mpsc::UnboundedReceiver<EngineEvent>) {
        let config = BridgeConfig {
            relay_mode: RelayMode::External,
            ..BridgeConfig::default()
        };
        ProvisioningEngine::new(shell, config).unwrap()
    }

    /// Capture the wallet continuation's resolution.
    fn capturing_handler() -> (PassHandler, oneshot::Receiver<ActivationMaterial>) {
        let (tx, rx) = oneshot::channel();
        let handler: PassHandler = Box::new(move |material| {
            let _ = tx.send(material);
        });
        (handler, rx)
    }

    #[tokio::test]
    async fn external_handshake_succeeds_once_and_frees_the_engine() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, mut events) = external_engine(shell.clone());

        let handle = engine.start_provisioning(request()).unwrap();
        assert!(engine.active_session().is_some());

        let delegate = shell.delegate();
        let (handler, resolved) = capturing_handler();
        delegate.binding_material_requested(material(), handler);

        // The binding material is relayed out, base64-encoded, chain order
        // intact.
        match events.recv().await.unwrap() {
            EngineEvent::BindingMaterialRequested { card_id, material: wire, .. } => {
                assert_eq!(card_id, "crd-123");
                assert_eq!(decode_binding_material(&wire).unwrap(), material());
            }
            other => panic!("unexpected event {other:?}"),
        }

        engine.complete_activation(activation()).unwrap();
        assert_eq!(resolved.await.unwrap(), activation());

        delegate.enrollment_finished(FinishVerdict::added(pass_info()));
        assert_eq!(
            handle.outcome.await.unwrap(),
            ProvisioningOutcome::Added(pass_info())
        );

        match events.recv().await.unwrap() {
            EngineEvent::ProvisioningResult { outcome, .. } => {
                assert_eq!(outcome, ProvisioningOutcome::Added(pass_info()));
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Terminal outcome closed the session; a fresh start is accepted.
        assert!(engine.active_session().is_none());
        assert!(engine.start_provisioning(request()).is_ok());
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_the_shell() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) = external_engine(shell.clone());

        let mut invalid = request();
        invalid.cardholder_name = "".into();
        let err = engine.start_provisioning(invalid).unwrap_err();
        assert!(matches!(err, CardBridgeError::MissingField("cardholderName")));
        assert_eq!(shell.present_count(), 0);
        assert!(engine.active_session().is_none());
    }

    #[tokio::test]
    async fn incapable_device_short_circuits_without_a_session() {
        let shell = Arc::new(FakeShell::incapable());
        let (engine, _events) = external_engine(shell.clone());

        let err = engine.start_provisioning(request()).unwrap_err();
        assert!(matches!(err, CardBridgeError::DeviceCannotEnroll));
        assert_eq!(shell.present_count(), 0);
        assert!(engine.active_session().is_none());
    }

    #[tokio::test]
    async fn presentation_failure_tears_the_session_down() {
        let shell = Arc::new(FakeShell::capable().failing_presentation());
        let (engine, _events) = external_engine(shell);

        let err = engine.start_provisioning(request()).unwrap_err();
        assert!(matches!(err, CardBridgeError::Configuration(_)));
        assert!(engine.active_session().is_none());
    }

    #[tokio::test]
    async fn second_start_is_rejected_and_first_survives() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) = external_engine(shell.clone());

        let handle = engine.start_provisioning(request()).unwrap();
        let err = engine.start_provisioning(request()).unwrap_err();
        assert!(matches!(err, CardBridgeError::SessionAlreadyActive));
        assert_eq!(shell.present_count(), 1);

        // The first session still runs to its own outcome.
        shell.delegate().enrollment_finished(FinishVerdict::cancelled());
        assert_eq!(
            handle.outcome.await.unwrap(),
            ProvisioningOutcome::Cancelled
        );
    }

    #[tokio::test]
    async fn finish_without_pass_or_error_is_cancellation() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) = external_engine(shell.clone());

        let handle = engine.start_provisioning(request()).unwrap();
        shell.delegate().enrollment_finished(FinishVerdict::cancelled());

        assert_eq!(
            handle.outcome.await.unwrap(),
            ProvisioningOutcome::Cancelled
        );
        assert!(engine.active_session().is_none());
    }

    #[tokio::test]
    async fn binding_material_without_session_resolves_inert() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) = external_engine(shell);

        let (handler, resolved) = capturing_handler();
        engine.binding_material_requested(material(), handler);

        assert!(resolved.await.unwrap().is_inert());
    }

    #[tokio::test]
    async fn complete_without_session_is_an_error_not_a_crash() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) = external_engine(shell);

        let err = engine.complete_activation(activation()).unwrap_err();
        assert!(matches!(err, CardBridgeError::NoActiveSession));
    }

    #[tokio::test]
    async fn second_completion_cannot_resolve_twice() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) = external_engine(shell.clone());

        let _handle = engine.start_provisioning(request()).unwrap();
        let (handler, resolved) = capturing_handler();
        shell.delegate().binding_material_requested(material(), handler);

        engine.complete_activation(activation()).unwrap();
        assert_eq!(resolved.await.unwrap(), activation());

        // The continuation was consumed; a second completion has nothing to
        // resolve and reports protocol misuse.
        let err = engine.complete_activation(activation()).unwrap_err();
        assert!(matches!(err, CardBridgeError::NoActiveSession));
    }

    #[tokio::test]
    async fn incomplete_activation_fails_the_session_and_resolves_inert() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) = external_engine(shell.clone());

        let handle = engine.start_provisioning(request()).unwrap();
        let (handler, resolved) = capturing_handler();
        shell.delegate().binding_material_requested(material(), handler);

        let mut incomplete = activation();
        incomplete.encrypted_pass_data.clear();
        let err = engine.complete_activation(incomplete).unwrap_err();
        assert!(matches!(err, CardBridgeError::InvalidPayload(_)));

        assert!(resolved.await.unwrap().is_inert());
        match handle.outcome.await.unwrap() {
            ProvisioningOutcome::Failed { reason, .. } => {
                assert_eq!(reason, "invalid_payload");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(engine.active_session().is_none());
    }

    #[tokio::test]
    async fn internal_relay_tokenizes_and_resolves_the_continuation() {
        let (endpoint, _req) = serve_once(200, &activation_json()).await;

        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) =
            ProvisioningEngine::new(shell.clone(), BridgeConfig::default()).unwrap();

        let mut req = request();
        req.tokenization_endpoint = Some(endpoint);
        req.tokenization_auth_token = Some("tok-1".into());
        let handle = engine.start_provisioning(req).unwrap();

        let delegate = shell.delegate();
        let (handler, resolved) = capturing_handler();
        delegate.binding_material_requested(material(), handler);

        let relayed = resolved.await.unwrap();
        assert_eq!(relayed.activation_data, b"activation-bytes");
        assert_eq!(relayed.encrypted_pass_data, b"encrypted-bytes");

        delegate.enrollment_finished(FinishVerdict::added(pass_info()));
        assert_eq!(
            handle.outcome.await.unwrap(),
            ProvisioningOutcome::Added(pass_info())
        );
    }

    #[tokio::test]
    async fn internal_relay_http_500_fails_terminally_with_status() {
        let (endpoint, _req) = serve_once(500, "{}").await;

        let shell = Arc::new(FakeShell::capable());
        let (engine, mut events) =
            ProvisioningEngine::new(shell.clone(), BridgeConfig::default()).unwrap();

        let mut req = request();
        req.tokenization_endpoint = Some(endpoint);
        let handle = engine.start_provisioning(req).unwrap();

        let (handler, resolved) = capturing_handler();
        shell.delegate().binding_material_requested(material(), handler);

        // The wallet continuation is resolved inert so the sheet can close.
        assert!(resolved.await.unwrap().is_inert());

        match handle.outcome.await.unwrap() {
            ProvisioningOutcome::Failed { reason, .. } => {
                assert_eq!(reason, "tokenization_http_500");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        match events.recv().await.unwrap() {
            EngineEvent::ProvisioningResult { outcome, .. } => {
                assert!(matches!(outcome, ProvisioningOutcome::Failed { .. }));
            }
            other => panic!("unexpected event {other:?}"),
        }

        // A late finish verdict from the sheet is absorbed quietly.
        shell.delegate().enrollment_finished(FinishVerdict::cancelled());
        assert!(engine.active_session().is_none());
    }

    #[tokio::test]
    async fn internal_relay_missing_field_is_invalid_payload() {
        let response = r#"{"data":{"activation_data":"YWJj","ephemeral_public_key":"eHl6"}}"#;
        let (endpoint, _req) = serve_once(200, response).await;

        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) =
            ProvisioningEngine::new(shell.clone(), BridgeConfig::default()).unwrap();

        let mut req = request();
        req.tokenization_endpoint = Some(endpoint);
        let handle = engine.start_provisioning(req).unwrap();

        let (handler, resolved) = capturing_handler();
        shell.delegate().binding_material_requested(material(), handler);

        assert!(resolved.await.unwrap().is_inert());
        match handle.outcome.await.unwrap() {
            ProvisioningOutcome::Failed { reason, .. } => {
                assert_eq!(reason, "invalid_payload");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wallet_error_verdict_maps_to_failed_outcome() {
        let shell = Arc::new(FakeShell::capable());
        let (engine, _events) = external_engine(shell.clone());

        let handle = engine.start_provisioning(request()).unwrap();
        shell
            .delegate()
            .enrollment_finished(FinishVerdict::failed("issuer refused"));

        match handle.outcome.await.unwrap() {
            ProvisioningOutcome::Failed { reason, message } => {
                assert_eq!(reason, "provisioning_failed");
                assert_eq!(message, "issuer refused");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
