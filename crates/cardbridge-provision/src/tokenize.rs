// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async client for the issuer tokenization endpoint.
//
// One POST per provisioning attempt, no retries: a failed exchange is
// terminal for the session and the caller decides whether to start over.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, error, instrument};

use cardbridge_core::error::{CardBridgeError, Result};
use cardbridge_core::types::ActivationMaterial;

use crate::payload::{decode_activation, TokenizeRequestBody, TokenizeResponseBody};

/// Async HTTP client for exchanging binding material for activation
/// material.
///
/// The underlying `reqwest::Client` carries a bounded request timeout; a
/// stuck issuer resolves as a network error instead of hanging the
/// enrollment sheet.
pub struct TokenizationClient {
    http: reqwest::Client,
}

impl TokenizationClient {
    /// Create a client with the given request timeout.
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CardBridgeError::Configuration(format!("http client: {e}")))?;
        Ok(Self { http })
    }

    /// Exchange binding material for activation material.  Single attempt.
    ///
    /// Only a 2xx status is success.  The response must be JSON with a
    /// top-level `data` object carrying the three base64 activation fields.
    #[instrument(skip(self, authorization, extra_headers, body), fields(endpoint = %endpoint))]
    pub async fn tokenize(
        &self,
        endpoint: &str,
        authorization: Option<&str>,
        extra_headers: &HashMap<String, String>,
        body: &TokenizeRequestBody,
    ) -> Result<ActivationMaterial> {
        let headers = build_headers(authorization, extra_headers)?;

        debug!(
            certificates = body.certificates.len(),
            has_user_id = body.user_id.is_some(),
            "sending tokenization request"
        );

        let response = self
            .http
            .post(endpoint)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("tokenization request failed: {e}");
                if e.is_timeout() {
                    CardBridgeError::Network(format!("request timed out: {e}"))
                } else {
                    CardBridgeError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "tokenization endpoint rejected request");
            return Err(CardBridgeError::Http {
                status: status.as_u16(),
            });
        }

        let parsed: TokenizeResponseBody = response
            .json()
            .await
            .map_err(|e| CardBridgeError::InvalidResponse(e.to_string()))?;

        let material = decode_activation(&parsed.data)?;
        debug!(
            activation_len = material.activation_data.len(),
            pass_data_len = material.encrypted_pass_data.len(),
            "tokenization succeeded"
        );
        Ok(material)
    }
}

/// Merge the default headers with the caller's.  Caller headers are
/// inserted last and therefore take precedence.
fn build_headers(
    authorization: Option<&str>,
    extra_headers: &HashMap<String, String>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(auth) = authorization {
        let value = HeaderValue::from_str(auth).map_err(|e| CardBridgeError::InvalidField {
            field: "tokenizationAuthorization",
            detail: e.to_string(),
        })?;
        headers.insert(AUTHORIZATION, value);
    }

    for (name, value) in extra_headers {
        let name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| CardBridgeError::InvalidField {
                field: "tokenizationHeaders",
                detail: format!("{name}: {e}"),
            })?;
        let value = HeaderValue::from_str(value).map_err(|e| CardBridgeError::InvalidField {
            field: "tokenizationHeaders",
            detail: e.to_string(),
        })?;
        headers.insert(name, value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{activation_json, serve_once};
    use cardbridge_core::types::BindingMaterial;
    use std::time::Duration;

    fn body() -> TokenizeRequestBody {
        TokenizeRequestBody::new(
            "crd-1",
            Some("usr-1"),
            &BindingMaterial {
                certificates: vec![b"leaf".to_vec(), b"root".to_vec()],
                nonce: b"nonce".to_vec(),
                nonce_signature: b"sig".to_vec(),
            },
        )
    }

    fn client() -> TokenizationClient {
        TokenizationClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn status_201_is_success() {
        let (endpoint, _req) = serve_once(201, &activation_json()).await;
        let material = client()
            .tokenize(&endpoint, Some("Bearer tok"), &HashMap::new(), &body())
            .await
            .unwrap();
        assert!(material.is_complete());
    }

    #[tokio::test]
    async fn status_500_maps_to_http_error() {
        let (endpoint, _req) = serve_once(500, "{}").await;
        let err = client()
            .tokenize(&endpoint, None, &HashMap::new(), &body())
            .await
            .unwrap_err();
        assert!(matches!(err, CardBridgeError::Http { status: 500 }));
    }

    #[tokio::test]
    async fn non_json_body_is_invalid_response() {
        let (endpoint, _req) = serve_once(200, "not json at all").await;
        let err = client()
            .tokenize(&endpoint, None, &HashMap::new(), &body())
            .await
            .unwrap_err();
        assert!(matches!(err, CardBridgeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn missing_activation_field_is_invalid_payload() {
        let response = r#"{"data":{"activation_data":"YWJj","ephemeral_public_key":"eHl6"}}"#;
        let (endpoint, _req) = serve_once(200, response).await;
        let err = client()
            .tokenize(&endpoint, None, &HashMap::new(), &body())
            .await
            .unwrap_err();
        match err {
            CardBridgeError::InvalidPayload(detail) => {
                assert!(detail.contains("encrypted_pass_data"));
            }
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_carries_auth_and_json_body() {
        let (endpoint, req) = serve_once(200, &activation_json()).await;
        client()
            .tokenize(&endpoint, Some("Bearer tok-9"), &HashMap::new(), &body())
            .await
            .unwrap();

        let request = req.await.unwrap();
        assert!(request.contains("POST /"));
        assert!(request.contains("authorization: Bearer tok-9"));
        assert!(request.contains("content-type: application/json"));
        assert!(request.contains("\"card_id\":\"crd-1\""));
        assert!(request.contains("\"user_id\":\"usr-1\""));
        assert!(request.contains("\"nonce_signature\""));
    }

    #[tokio::test]
    async fn caller_headers_override_defaults() {
        let (endpoint, req) = serve_once(200, &activation_json()).await;
        let mut extra = HashMap::new();
        extra.insert("Authorization".to_string(), "Custom scheme-x".to_string());
        client()
            .tokenize(&endpoint, Some("Bearer ignored"), &extra, &body())
            .await
            .unwrap();

        let request = req.await.unwrap();
        assert!(request.contains("authorization: Custom scheme-x"));
        assert!(!request.contains("Bearer ignored"));
    }

    #[test]
    fn invalid_header_name_rejected() {
        let mut extra = HashMap::new();
        extra.insert("bad header\n".to_string(), "v".to_string());
        let err = build_headers(None, &extra).unwrap_err();
        assert!(matches!(err, CardBridgeError::InvalidField { .. }));
    }
}
