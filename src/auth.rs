//! OAuth token retrieval. The token is used as the broker password.

use crate::config::{CredentialConfig, TlsPolicy};
use crate::error::{LoadError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Extract `access_token` from the endpoint's JSON body.
pub fn parse_token_response(body: &str) -> Result<String> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| LoadError::credential(format!("malformed token response: {}", e)))?;
    if parsed.access_token.is_empty() {
        return Err(LoadError::credential("token response has an empty access_token"));
    }
    Ok(parsed.access_token)
}

/// POST the password grant as a urlencoded form and return the access token.
pub async fn fetch_access_token(credentials: &CredentialConfig, tls: TlsPolicy) -> Result<String> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(tls == TlsPolicy::AcceptInvalidCertificates)
        .timeout(TOKEN_REQUEST_TIMEOUT)
        .build()?;

    debug!(url = %credentials.token_url, "Requesting access token");
    let response = client
        .post(&credentials.token_url)
        .form(&credentials.form_fields())
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let snippet: String = body.chars().take(200).collect();
        return Err(LoadError::credential(format!(
            "token endpoint returned {}: {}",
            status, snippet
        )));
    }

    let token = parse_token_response(&body)?;
    info!(token_len = token.len(), "Access token obtained");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_access_token() {
        let body = r#"{"access_token":"eyJhbGciOi.abc.def","token_type":"bearer","expires_in":43199}"#;
        assert_eq!(parse_token_response(body).unwrap(), "eyJhbGciOi.abc.def");
    }

    #[test]
    fn missing_token_field_is_a_credential_error() {
        let err = parse_token_response(r#"{"error":"unauthorized"}"#).unwrap_err();
        assert!(matches!(err, LoadError::Credential { .. }));
    }

    #[test]
    fn non_json_body_is_a_credential_error() {
        let err = parse_token_response("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, LoadError::Credential { .. }));
        assert!(!err.is_configuration());
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(parse_token_response(r#"{"access_token":""}"#).is_err());
    }

    #[test]
    fn form_fields_are_in_wire_order() {
        let settings = crate::config::tests::settings_with(&[]);
        let names: Vec<&str> = settings
            .credentials
            .form_fields()
            .iter()
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(
            names,
            ["client_id", "client_secret", "grant_type", "username", "password", "response_type"]
        );
    }
}
