/*
    session.rs - Session tokens

    A token is the URL-safe base64 encoding of `{sub, role, exp}` as JSON,
    with `exp` in epoch seconds.
    Tokens are not signed; verification is decode plus expiry check, and the
    guards additionally compare the claimed role with the stored person.
*/

use crate::core_store::model::{PersonId, Role, Timestamp};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default session lifetime
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Malformed session token")]
    Malformed,

    #[error("Session expired")]
    Expired,
}

/// Decoded token contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: PersonId,
    pub role: Role,
    /// Expiry, epoch seconds
    pub exp: u64,
}

/// Session handed back with every operation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub person_id: PersonId,
    pub role: Role,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct SessionCodec {
    ttl: Duration,
}

impl Default for SessionCodec {
    fn default() -> Self {
        SessionCodec::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionCodec {
    pub fn new(ttl: Duration) -> Self {
        SessionCodec { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh session starting at `now`
    pub fn issue(&self, person_id: &PersonId, role: Role, now: Timestamp) -> Session {
        let exp = (now.as_millis() + self.ttl.as_millis() as u64) / 1000;
        let claims = SessionClaims {
            sub: person_id.clone(),
            role,
            exp,
        };
        let expires_at = expiry_timestamp(exp);
        Session {
            token: Self::encode(&claims),
            person_id: person_id.clone(),
            role,
            expires_at,
        }
    }

    pub fn encode(claims: &SessionClaims) -> String {
        // serializing plain strings and integers cannot fail
        let json = serde_json::to_vec(claims).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token and check it has not expired at `now`
    pub fn verify(&self, token: &str, now: Timestamp) -> Result<SessionClaims, SessionError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim().as_bytes())
            .map_err(|_| SessionError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&bytes).map_err(|_| SessionError::Malformed)?;

        if claims.exp <= now.as_millis() / 1000 {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    /// Rebuild the session value for a verified token
    pub fn session_for(&self, token: &str, claims: &SessionClaims) -> Session {
        Session {
            token: token.trim().to_string(),
            person_id: claims.sub.clone(),
            role: claims.role,
            expires_at: expiry_timestamp(claims.exp),
        }
    }
}

fn expiry_timestamp(exp_secs: u64) -> Timestamp {
    Timestamp::from_millis(exp_secs.saturating_mul(1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let codec = SessionCodec::default();
        let id = PersonId::new("p1");
        let now = Timestamp::from_millis(1_000);

        let session = codec.issue(&id, Role::Teacher, now);
        assert_eq!(session.expires_at.as_millis(), 1_000 + 8 * 3600 * 1000);

        let claims = codec.verify(&session.token, now).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Teacher);
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = SessionCodec::new(Duration::from_secs(60));
        let session = codec.issue(&PersonId::new("p1"), Role::Student, Timestamp::from_millis(0));

        let later = Timestamp::from_millis(60_000);
        assert_eq!(codec.verify(&session.token, later), Err(SessionError::Expired));
    }

    #[test]
    fn test_expiry_claim_in_epoch_seconds() {
        let codec = SessionCodec::new(Duration::from_secs(60));
        let now = Timestamp::from_millis(1_700_000_000_500);
        let session = codec.issue(&PersonId::new("p1"), Role::Parent, now);

        let json = URL_SAFE_NO_PAD.decode(session.token.as_bytes()).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(raw["exp"], 1_700_000_060u64);
        assert_eq!(session.expires_at.as_millis(), 1_700_000_060_000);

        let claims = codec.verify(&session.token, now).unwrap();
        assert_eq!(codec.session_for(&session.token, &claims), session);

        // Still valid in the last second before expiry
        let almost = Timestamp::from_millis(1_700_000_059_999);
        assert!(codec.verify(&session.token, almost).is_ok());
        let at_expiry = Timestamp::from_millis(1_700_000_060_000);
        assert_eq!(codec.verify(&session.token, at_expiry), Err(SessionError::Expired));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let codec = SessionCodec::default();
        let now = Timestamp::now();
        assert_eq!(codec.verify("!!!", now), Err(SessionError::Malformed));

        let not_claims = URL_SAFE_NO_PAD.encode(b"{\"hello\":1}");
        assert_eq!(codec.verify(&not_claims, now), Err(SessionError::Malformed));
    }

    #[test]
    fn test_token_is_url_safe() {
        let codec = SessionCodec::default();
        let session = codec.issue(&PersonId::generate(), Role::Administrator, Timestamp::now());
        assert!(session
            .token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
