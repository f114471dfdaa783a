// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared test fixtures: a scriptable wallet shell and a one-connection
// HTTP server for exercising the tokenization client without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

use cardbridge_bridge::traits::{
    EnrollmentConfig, EnrollmentDelegate, EnrollmentShell, WalletProbeShell, WalletShell,
};
use cardbridge_core::error::{CardBridgeError, Result};
use cardbridge_core::types::EnrolledCard;

/// Scriptable wallet shell for engine and probe tests.
pub struct FakeShell {
    available: bool,
    can_enroll: bool,
    cards: Vec<EnrolledCard>,
    fail_present: bool,
    presented: AtomicUsize,
    delegate: Mutex<Option<Arc<dyn EnrollmentDelegate>>>,
}

impl FakeShell {
    pub fn capable() -> Self {
        Self {
            available: true,
            can_enroll: true,
            cards: Vec::new(),
            fail_present: false,
            presented: AtomicUsize::new(0),
            delegate: Mutex::new(None),
        }
    }

    pub fn incapable() -> Self {
        Self {
            available: false,
            can_enroll: false,
            cards: Vec::new(),
            fail_present: false,
            presented: AtomicUsize::new(0),
            delegate: Mutex::new(None),
        }
    }

    pub fn with_cards(mut self, cards: Vec<EnrolledCard>) -> Self {
        self.cards = cards;
        self
    }

    pub fn failing_presentation(mut self) -> Self {
        self.fail_present = true;
        self
    }

    /// Number of times the enrollment sheet was presented.
    pub fn present_count(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }

    /// The delegate captured by the most recent presentation.
    pub fn delegate(&self) -> Arc<dyn EnrollmentDelegate> {
        self.delegate
            .lock()
            .unwrap()
            .clone()
            .expect("no enrollment presented")
    }
}

impl WalletShell for FakeShell {
    fn platform_name(&self) -> &str {
        "Fake"
    }
}

impl WalletProbeShell for FakeShell {
    fn wallet_available(&self) -> bool {
        self.available
    }

    fn can_enroll(&self) -> bool {
        self.can_enroll
    }

    fn enrolled_cards(&self) -> Result<Vec<EnrolledCard>> {
        Ok(self.cards.clone())
    }
}

impl EnrollmentShell for FakeShell {
    fn present_enrollment(
        &self,
        _config: &EnrollmentConfig,
        delegate: Arc<dyn EnrollmentDelegate>,
    ) -> Result<()> {
        if self.fail_present {
            return Err(CardBridgeError::Configuration(
                "fake shell refused to present".into(),
            ));
        }
        self.presented.fetch_add(1, Ordering::SeqCst);
        *self.delegate.lock().unwrap() = Some(delegate);
        Ok(())
    }

    fn dismiss_enrollment(&self) {}
}

/// A well-formed issuer response body.
pub fn activation_json() -> String {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    serde_json::json!({
        "data": {
            "activation_data": BASE64.encode(b"activation-bytes"),
            "encrypted_pass_data": BASE64.encode(b"encrypted-bytes"),
            "ephemeral_public_key": BASE64.encode(b"ephemeral-key"),
        }
    })
    .to_string()
}

/// Serve exactly one HTTP request with a canned response.
///
/// Returns the endpoint URL and a receiver for the raw request text
/// (start line, headers, and body) as the client sent it.
pub async fn serve_once(status: u16, body: &str) -> (String, oneshot::Receiver<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();
    let body = body.to_string();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.expect("read request");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(header_end) = find(&buf, b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        let reason = match status {
            200 => "OK",
            201 => "Created",
            500 => "Internal Server Error",
            _ => "Response",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len(),
        );
        stream
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        let _ = stream.shutdown().await;

        let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
    });

    (format!("http://{addr}/"), rx)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
