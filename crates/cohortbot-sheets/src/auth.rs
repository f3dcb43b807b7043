//! Google service-account authentication: RS256-signed JWT exchanged for
//! a short-lived bearer token.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cohortbot_core::error::{CohortBotError, Result};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

/// The fields of a service-account JSON keyfile we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
}

/// Read and parse a service-account keyfile.
pub fn load_keyfile(path: &Path) -> Result<ServiceAccountKey> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CohortBotError::Sheets(format!("Failed to read keyfile: {e}")))?;
    serde_json::from_str(&content)
        .map_err(|e| CohortBotError::Sheets(format!("Invalid keyfile: {e}")))
}

/// Build the signed JWT assertion for the given issue time.
pub fn build_assertion(key: &ServiceAccountKey, issued_at: i64) -> Result<String> {
    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "RS256", "typ": "JWT" }).to_string());
    let claims = URL_SAFE_NO_PAD.encode(
        json!({
            "iss": key.client_email,
            "scope": SCOPE,
            "aud": TOKEN_URI,
            "iat": issued_at,
            "exp": issued_at + 3600,
        })
        .to_string(),
    );
    let signing_input = format!("{header}.{claims}");

    let private_key = RsaPrivateKey::from_pkcs8_pem(&key.private_key)
        .map_err(|e| CohortBotError::Sheets(format!("Invalid private key: {e}")))?;
    let signing_key = SigningKey::<Sha256>::new(private_key);
    let signature = signing_key.sign(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchange a signed assertion for a bearer token.
pub async fn fetch_token(client: &reqwest::Client, key: &ServiceAccountKey) -> Result<String> {
    let assertion = build_assertion(key, chrono::Utc::now().timestamp())?;
    let resp = client
        .post(TOKEN_URI)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .await
        .map_err(|e| CohortBotError::Sheets(format!("Token request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(CohortBotError::Sheets(format!(
            "Token exchange error {status}: {body}"
        )));
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| CohortBotError::Sheets(format!("Invalid token response: {e}")))?;
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_is_three_segments() {
        // Throwaway 2048-bit key generated for tests only.
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(
            &private_key,
            rsa::pkcs8::LineEnding::LF,
        )
        .unwrap();
        let key = ServiceAccountKey {
            client_email: "bot@example.iam.gserviceaccount.com".into(),
            private_key: pem.to_string(),
        };

        let jwt = build_assertion(&key, 1_700_000_000).unwrap();
        let segments: Vec<&str> = jwt.split('.').collect();
        assert_eq!(segments.len(), 3);

        let claims_json = URL_SAFE_NO_PAD.decode(segments[1]).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&claims_json).unwrap();
        assert_eq!(claims["iss"], "bot@example.iam.gserviceaccount.com");
        assert_eq!(claims["exp"], 1_700_003_600_i64);
        assert_eq!(claims["aud"], TOKEN_URI);
    }

    #[test]
    fn test_bad_pem_is_an_error() {
        let key = ServiceAccountKey {
            client_email: "bot@example".into(),
            private_key: "not a pem".into(),
        };
        assert!(build_assertion(&key, 0).is_err());
    }
}
