use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use linkform_contracts::LinkClaims;

/// Opaque token failure. Callers outside this crate must not branch on the
/// cause; the boundary collapses every decode failure into one not-found
/// outcome so a link guesser learns nothing. `code` and `message` exist for
/// server-side logs only and never contain the raw token or the secret.
#[derive(Debug, Clone)]
pub struct TokenError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for TokenError {}

/// Verifies and decodes link tokens signed HS256 with the shared app secret.
///
/// Decoding is pure: no logging, no side effects. Expiry is enforced when a
/// token carries an `exp` claim (with the configured leeway); tokens without
/// `exp` never expire.
#[derive(Clone)]
pub struct LinkVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl LinkVerifier {
    pub fn new(secret: &str, leeway: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway.as_secs();
        // `exp` stays optional; issued links predating expiry support carry
        // no expiry claim.
        validation.required_spec_claims.clear();

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn decode(&self, token: &str) -> Result<LinkClaims, TokenError> {
        let data =
            decode::<LinkClaims>(token, &self.decoding_key, &self.validation).map_err(|err| {
                TokenError {
                    code: token_error_code(&err),
                    message: "link token verification failed".to_string(),
                }
            })?;

        Ok(data.claims)
    }
}

fn token_error_code(err: &jsonwebtoken::errors::Error) -> &'static str {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::InvalidSignature => "ERR_TOKEN_SIGNATURE",
        ErrorKind::ExpiredSignature => "ERR_TOKEN_EXPIRED",
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            "ERR_TOKEN_MALFORMED"
        }
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => "ERR_TOKEN_ALGORITHM",
        _ => "ERR_TOKEN_INVALID",
    }
}

/// Encode half of the codec. Link issuance is a separate process, but it and
/// the tests share this one implementation so claims shape and signing stay
/// in lockstep with `LinkVerifier`.
pub fn sign_link(claims: &LinkClaims, secret: &str) -> Result<String, TokenError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError {
        code: "ERR_TOKEN_ENCODE",
        message: "failed to encode link token".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkform_contracts::FieldDescriptor;

    const SECRET: &str = "test-secret";

    fn verifier() -> LinkVerifier {
        LinkVerifier::new(SECRET, Duration::from_secs(0))
    }

    #[test]
    fn decode_round_trips_claims() {
        let mut claims = LinkClaims::new("b1", "t1", "r1");
        claims.fields = Some(vec![
            FieldDescriptor::new("email").required(),
            FieldDescriptor::new("note").readonly(),
        ]);
        claims.title = Some("Name".to_string());

        let token = sign_link(&claims, SECRET).expect("token should sign");
        let decoded = verifier().decode(&token).expect("token should verify");

        assert_eq!(decoded, claims);
    }

    #[test]
    fn decode_rejects_wrong_secret() {
        let claims = LinkClaims::new("b1", "t1", "r1");
        let token = sign_link(&claims, "other-secret").expect("token should sign");

        let err = verifier().decode(&token).unwrap_err();
        assert_eq!(err.code, "ERR_TOKEN_SIGNATURE");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = verifier().decode("not-a-jwt").unwrap_err();
        assert_eq!(err.code, "ERR_TOKEN_MALFORMED");
    }

    #[test]
    fn decode_rejects_tampered_payload() {
        let claims = LinkClaims::new("b1", "t1", "r1");
        let token = sign_link(&claims, SECRET).expect("token should sign");

        let mut other = LinkClaims::new("b1", "t1", "r2");
        other.exp = None;
        let other_token = sign_link(&other, SECRET).expect("token should sign");

        // Signature from one token, payload from another.
        let payload = token.split('.').nth(1).expect("jwt should have payload");
        let mut parts = other_token.split('.');
        let header = parts.next().expect("jwt should have header");
        let _ = parts.next();
        let signature = parts.next().expect("jwt should have signature");
        let forged = format!("{}.{}.{}", header, payload, signature);

        assert!(verifier().decode(&forged).is_err());
    }

    #[test]
    fn expiry_enforced_only_when_present() {
        let mut expired = LinkClaims::new("b1", "t1", "r1");
        expired.exp = Some(1_000_000_000);
        let token = sign_link(&expired, SECRET).expect("token should sign");
        let err = verifier().decode(&token).unwrap_err();
        assert_eq!(err.code, "ERR_TOKEN_EXPIRED");

        let eternal = LinkClaims::new("b1", "t1", "r1");
        let token = sign_link(&eternal, SECRET).expect("token should sign");
        verifier()
            .decode(&token)
            .expect("token without exp should never expire");
    }

    #[test]
    fn leeway_tolerates_recent_expiry() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock should be past the epoch")
            .as_secs();

        let mut claims = LinkClaims::new("b1", "t1", "r1");
        claims.exp = Some(now - 10);
        let token = sign_link(&claims, SECRET).expect("token should sign");

        LinkVerifier::new(SECRET, Duration::from_secs(60))
            .decode(&token)
            .expect("expiry within leeway should pass");
    }
}
