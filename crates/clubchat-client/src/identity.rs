//! Self identity.
//!
//! The access token's subject claim is not the application user id; it is
//! resolved with a lookup call. Resolution is two steps (decode here, lookup
//! by the driver) and failure at either step degrades to "unknown self"
//! rather than failing the session.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use clubchat_proto::UserId;
use serde_json::Value;

/// Subject claim of a JWT access token, without verifying it.
///
/// Returns `None` for anything that is not a three-part token whose payload
/// is base64url JSON with a non-empty `sub`. Numeric subjects are accepted.
pub fn token_subject(token: &str) -> Option<String> {
    let token = token.trim().trim_start_matches("Bearer ").trim();
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let subject = match claims.get("sub")? {
        Value::String(sub) => sub.trim().to_string(),
        Value::Number(sub) => sub.to_string(),
        _ => return None,
    };
    (!subject.is_empty()).then_some(subject)
}

/// What the session knows about the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfIdentity {
    /// Lookup not finished.
    Pending {
        /// Subject to resolve.
        subject: String,
        /// Whether the lookup has been issued.
        requested: bool,
    },
    /// Resolved application user id.
    Known(UserId),
    /// Could not be determined; own/other styling is skipped.
    Unknown,
}

impl SelfIdentity {
    /// Initial identity for an optional access token.
    pub fn from_token(token: Option<&str>) -> Self {
        match token.and_then(token_subject) {
            Some(subject) => Self::Pending { subject, requested: false },
            None => {
                tracing::warn!("no usable token subject, self identity unknown");
                Self::Unknown
            },
        }
    }

    /// Lookup finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }

    /// Resolved id, if any.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Known(id) => Some(id),
            Self::Pending { .. } | Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE;

    use super::*;

    fn token(claims: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.c2ln", URL_SAFE_NO_PAD.encode(claims))
    }

    #[test]
    fn reads_string_subject() {
        assert_eq!(token_subject(&token(r#"{"sub":"kakao_123"}"#)), Some("kakao_123".to_string()));
    }

    #[test]
    fn reads_numeric_subject_and_bearer_prefix() {
        let bearer = format!("Bearer {}", token(r#"{"sub":42,"exp":1}"#));
        assert_eq!(token_subject(&bearer), Some("42".to_string()));
    }

    #[test]
    fn tolerates_padding() {
        let padded = format!("h.{}.s", URL_SAFE.encode(r#"{"sub":"abc"}"#));
        assert_eq!(token_subject(&padded), Some("abc".to_string()));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert_eq!(token_subject(""), None);
        assert_eq!(token_subject("not-a-jwt"), None);
        assert_eq!(token_subject("a.!!!.c"), None);
        assert_eq!(token_subject(&token(r#"{"name":"x"}"#)), None);
        assert_eq!(token_subject(&token(r#"{"sub":"  "}"#)), None);
        assert_eq!(token_subject(&format!("{}.extra", token(r#"{"sub":"x"}"#))), None);
    }

    #[test]
    fn identity_starts_pending_or_unknown() {
        let pending = SelfIdentity::from_token(Some(&token(r#"{"sub":"s"}"#)));
        assert!(!pending.is_settled());
        assert_eq!(SelfIdentity::from_token(None), SelfIdentity::Unknown);
        assert!(SelfIdentity::Unknown.is_settled());
    }
}
