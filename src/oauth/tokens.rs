//! RS256 access token issuance and verification.
//!
//! The key pair is loaded once at startup and never mutated. Verification
//! accepts exactly one algorithm: the one tokens are signed with.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use ulid::Ulid;

use crate::errors::TokenError;

/// The only algorithm tokens are signed and accepted with.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;
const SIGNING_ALGORITHM_NAME: &str = "RS256";

/// Claim set carried by every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("algorithm", &SIGNING_ALGORITHM_NAME)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Load the key pair from PEM files.
    pub fn from_pem_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
        issuer: impl Into<String>,
    ) -> Result<Self, TokenError> {
        let private_key_path = private_key_path.as_ref();
        let public_key_path = public_key_path.as_ref();

        let private_pem = std::fs::read(private_key_path).map_err(|e| {
            TokenError::SigningKeyUnavailable(format!(
                "failed to read private key {}: {}",
                private_key_path.display(),
                e
            ))
        })?;
        let public_pem = std::fs::read(public_key_path).map_err(|e| {
            TokenError::SigningKeyUnavailable(format!(
                "failed to read public key {}: {}",
                public_key_path.display(),
                e
            ))
        })?;

        Self::from_pem(&private_pem, &public_pem, issuer)
    }

    /// Build an issuer from PEM encoded RSA keys.
    ///
    /// The pair is checked by signing and verifying a probe token, so a
    /// mismatched public key fails here instead of on the first request.
    pub fn from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
        issuer: impl Into<String>,
    ) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem).map_err(|e| {
            TokenError::SigningKeyUnavailable(format!("failed to parse private key: {}", e))
        })?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem).map_err(|e| {
            TokenError::SigningKeyUnavailable(format!("failed to parse public key: {}", e))
        })?;

        let token_issuer = Self {
            issuer: issuer.into(),
            encoding_key,
            decoding_key,
        };

        let probe = token_issuer
            .issue("key-check", "key-check", Duration::minutes(1))
            .map_err(|e| TokenError::SigningKeyUnavailable(e.to_string()))?;
        token_issuer.verify(&probe).map_err(|_| {
            TokenError::SigningKeyUnavailable("public key does not match private key".to_string())
        })?;

        Ok(token_issuer)
    }

    /// Sign a new access token for `subject`, intended for `audience`.
    pub fn issue(&self, subject: &str, audience: &str, ttl: Duration) -> Result<String, TokenError> {
        self.issue_at(subject, audience, ttl, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        subject: &str,
        audience: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: audience.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Ulid::new().to_string(),
        };

        encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::SigningFailure(e.to_string()))
    }

    /// Verify signature, algorithm, issuer, and time claims of a token.
    ///
    /// Every failure is returned as a [`TokenError`]; attacker-controlled input
    /// never panics.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let algorithm = header_algorithm(token)?;
        if algorithm != SIGNING_ALGORITHM_NAME {
            return Err(TokenError::DisallowedAlgorithm(algorithm));
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => {
                    TokenError::DisallowedAlgorithm(algorithm.clone())
                }
                ErrorKind::ImmatureSignature => {
                    TokenError::Malformed("token is not valid yet".to_string())
                }
                ErrorKind::InvalidIssuer => TokenError::Malformed("unexpected issuer".to_string()),
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

/// Read the `alg` header field without trusting anything else in the token.
fn header_algorithm(token: &str) -> Result<String, TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed("expected three segments".to_string()));
    };

    let header_json = BASE64_URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenError::Malformed("invalid header encoding".to_string()))?;
    let header: serde_json::Value = serde_json::from_slice(&header_json)
        .map_err(|_| TokenError::Malformed("invalid header JSON".to_string()))?;

    header
        .get("alg")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| TokenError::Malformed("missing 'alg' in header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/private.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/public.pub");
    const OTHER_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/other_private.pem");
    const OTHER_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/other_public.pub");

    fn issuer() -> TokenIssuer {
        TokenIssuer::from_pem(
            PRIVATE_KEY.as_bytes(),
            PUBLIC_KEY.as_bytes(),
            "https://grantd.test",
        )
        .unwrap()
    }

    fn b64(value: serde_json::Value) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn test_issue_then_verify() {
        let issuer = issuer();
        let token = issuer
            .issue("jake", "test_cc_grant", Duration::minutes(5))
            .unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.iss, "https://grantd.test");
        assert_eq!(claims.sub, "jake");
        assert_eq!(claims.aud, "test_cc_grant");
        assert_eq!(claims.exp - claims.iat, 300);
        assert_eq!(claims.nbf, claims.iat);
        assert!(Ulid::from_string(&claims.jti).is_ok());
    }

    #[test]
    fn test_token_ids_are_unique() {
        let issuer = issuer();
        let first = issuer.issue("a", "b", Duration::minutes(5)).unwrap();
        let second = issuer.issue("a", "b", Duration::minutes(5)).unwrap();

        let first = issuer.verify(&first).unwrap();
        let second = issuer.verify(&second).unwrap();
        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn test_header_is_rs256() {
        let token = issuer().issue("a", "b", Duration::minutes(5)).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[test]
    fn test_expired_token() {
        let issuer = issuer();
        let token = issuer
            .issue_at("a", "b", Duration::hours(1), Utc::now() - Duration::hours(2))
            .unwrap();

        assert!(matches!(issuer.verify(&token), Err(TokenError::ExpiredToken)));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let issuer = issuer();
        let token = issuer
            .issue_at("a", "b", Duration::hours(1), Utc::now() + Duration::minutes(10))
            .unwrap();

        assert!(matches!(issuer.verify(&token), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_none_algorithm_rejected() {
        let issuer = issuer();
        let token = issuer.issue("a", "b", Duration::minutes(5)).unwrap();
        let payload = token.split('.').nth(1).unwrap();

        let unsigned = format!("{}.{}.", b64(json!({"alg": "none", "typ": "JWT"})), payload);
        assert!(matches!(
            issuer.verify(&unsigned),
            Err(TokenError::DisallowedAlgorithm(alg)) if alg == "none"
        ));
    }

    #[test]
    fn test_symmetric_algorithm_rejected() {
        let issuer = issuer();
        let claims = AccessTokenClaims {
            iss: "https://grantd.test".to_string(),
            sub: "a".to_string(),
            aud: "b".to_string(),
            iat: Utc::now().timestamp(),
            nbf: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            jti: Ulid::new().to_string(),
        };

        // HMAC keyed with the public key bytes: the classic confusion attack.
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(PUBLIC_KEY.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            issuer.verify(&forged),
            Err(TokenError::DisallowedAlgorithm(alg)) if alg == "HS256"
        ));
    }

    #[test]
    fn test_signature_from_other_key_rejected() {
        let other = TokenIssuer::from_pem(
            OTHER_PRIVATE_KEY.as_bytes(),
            OTHER_PUBLIC_KEY.as_bytes(),
            "https://grantd.test",
        )
        .unwrap();
        let token = other.issue("a", "b", Duration::minutes(5)).unwrap();

        assert!(matches!(
            issuer().verify(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let issuer = issuer();
        let token = issuer.issue("a", "b", Duration::minutes(5)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let claims: AccessTokenClaims = issuer.verify(&token).unwrap();
        let tampered_claims = AccessTokenClaims {
            sub: "admin".to_string(),
            ..claims
        };
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            b64(serde_json::to_value(tampered_claims).unwrap()),
            parts[2]
        );

        assert!(matches!(
            issuer.verify(&tampered),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let other = TokenIssuer::from_pem(
            PRIVATE_KEY.as_bytes(),
            PUBLIC_KEY.as_bytes(),
            "https://elsewhere.test",
        )
        .unwrap();
        let token = other.issue("a", "b", Duration::minutes(5)).unwrap();

        assert!(matches!(issuer().verify(&token), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let issuer = issuer();
        for token in [
            "",
            "yuayayuayayayaayayuay",
            "ey.ey.yuayayuayayayaayayuay",
            "a.b.c.d",
            "bm90IGpzb24.e30.c2ln",
        ] {
            assert!(
                matches!(issuer.verify(token), Err(TokenError::Malformed(_))),
                "expected malformed for {:?}",
                token
            );
        }
    }

    #[test]
    fn test_mismatched_key_pair_is_unavailable() {
        let result = TokenIssuer::from_pem(
            PRIVATE_KEY.as_bytes(),
            OTHER_PUBLIC_KEY.as_bytes(),
            "https://grantd.test",
        );
        assert!(matches!(result, Err(TokenError::SigningKeyUnavailable(_))));
    }

    #[test]
    fn test_unparseable_keys_are_unavailable() {
        let result = TokenIssuer::from_pem(b"not a key", PUBLIC_KEY.as_bytes(), "x");
        assert!(matches!(result, Err(TokenError::SigningKeyUnavailable(_))));

        let result = TokenIssuer::from_pem(PRIVATE_KEY.as_bytes(), b"not a key", "x");
        assert!(matches!(result, Err(TokenError::SigningKeyUnavailable(_))));
    }

    #[test]
    fn test_missing_key_files_are_unavailable() {
        let result = TokenIssuer::from_pem_files(
            "/nonexistent/private.pem",
            "/nonexistent/public.pub",
            "x",
        );
        assert!(matches!(result, Err(TokenError::SigningKeyUnavailable(_))));
    }
}
