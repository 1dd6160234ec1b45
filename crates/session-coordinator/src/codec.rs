//! Access token decoding.
//!
//! Tokens are JWT-shaped: three dot-separated segments with a base64url JSON
//! payload. Only the claims needed for lifecycle decisions are read. The
//! signature is never verified here; that is the backend's job.
//!
//! Decoding never fails loudly. Anything unparsable, or a payload without an
//! `exp` claim, becomes [`Decoded::Invalid`], which every check treats as
//! already expired.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::time::Duration;

/// Claims relevant to the session lifecycle.
///
/// Timestamps are held at millisecond precision, the finest a token carries.
/// The builders truncate; a claim set built by hand with sub-millisecond
/// instants does not survive an encode/decode round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    pub expires_at: DateTime<Utc>,
    pub subject: Option<String>,
    pub role: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    /// `jti`
    pub token_id: Option<String>,
}

impl ClaimSet {
    pub fn expiring_at(expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at: expires_at.trunc_subsecs(3),
            subject: None,
            role: None,
            issued_at: None,
            token_id: None,
        }
    }

    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at.trunc_subsecs(3));
        self
    }

    pub fn with_token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Result of decoding a token string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Valid(ClaimSet),
    Invalid,
}

/// How close a token is to expiry, relative to a refresh threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// More than the threshold remains
    Fresh,
    /// Still valid but inside the threshold
    Renewable { remaining: chrono::Duration },
    /// Expired or undecodable
    Expired,
}

impl Freshness {
    /// True for both `Renewable` and `Expired`.
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Freshness::Fresh)
    }
}

impl Decoded {
    pub fn claims(&self) -> Option<&ClaimSet> {
        match self {
            Decoded::Valid(claims) => Some(claims),
            Decoded::Invalid => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims().map(|c| c.expires_at)
    }

    pub fn role(&self) -> Option<&str> {
        self.claims().and_then(|c| c.role.as_deref())
    }

    /// `expiry <= now`. Invalid tokens are always expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Decoded::Valid(claims) => claims.expires_at <= now,
            Decoded::Invalid => true,
        }
    }

    /// `expiry - now < threshold`. Invalid tokens always qualify.
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self {
            Decoded::Valid(claims) => claims.expires_at - now < to_chrono(threshold),
            Decoded::Invalid => true,
        }
    }

    /// Classify the token for the refresh decision.
    pub fn assess(&self, now: DateTime<Utc>, threshold: Duration) -> Freshness {
        let Decoded::Valid(claims) = self else {
            return Freshness::Expired;
        };

        let remaining = claims.expires_at - now;
        if remaining <= chrono::Duration::zero() {
            Freshness::Expired
        } else if remaining < to_chrono(threshold) {
            Freshness::Renewable { remaining }
        } else {
            Freshness::Fresh
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 1000))
}

#[derive(Deserialize)]
struct RawClaims {
    exp: Option<Number>,
    #[serde(default)]
    iat: Option<Number>,
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    role: Option<Value>,
    #[serde(default)]
    jti: Option<Value>,
}

#[derive(Serialize)]
struct EncodedClaims<'a> {
    exp: Number,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jti: Option<&'a str>,
}

/// Header of tokens minted by [`CredentialCodec::encode`].
const UNSIGNED_HEADER: &str = r#"{"alg":"none","typ":"JWT"}"#;

/// Decodes and builds access tokens.
pub struct CredentialCodec;

impl CredentialCodec {
    /// Decode a token string. Never panics.
    pub fn decode(token: &str) -> Decoded {
        Self::try_decode(token).map_or(Decoded::Invalid, Decoded::Valid)
    }

    fn try_decode(token: &str) -> Option<ClaimSet> {
        let mut segments = token.trim().split('.');
        let (_header, payload, _signature) =
            (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() {
            return None;
        }

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let raw: RawClaims = serde_json::from_slice(&bytes).ok()?;

        Some(ClaimSet {
            expires_at: numeric_date(&raw.exp?)?,
            issued_at: raw.iat.as_ref().and_then(numeric_date),
            subject: raw.sub.as_ref().and_then(claim_string),
            role: raw.role.as_ref().and_then(claim_string),
            token_id: raw.jti.as_ref().and_then(claim_string),
        })
    }

    /// Build an unsigned token carrying `claims`.
    ///
    /// Timestamps keep millisecond precision, so decoding the result yields
    /// the same claims for any set made through the [`ClaimSet`] builders.
    pub fn encode(claims: &ClaimSet) -> String {
        let payload = EncodedClaims {
            exp: to_numeric_date(claims.expires_at),
            iat: claims.issued_at.map(to_numeric_date),
            sub: claims.subject.as_deref(),
            role: claims.role.as_deref(),
            jti: claims.token_id.as_deref(),
        };
        // Serializing a struct of numbers and strings cannot fail
        let payload = serde_json::to_vec(&payload).unwrap_or_default();

        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(UNSIGNED_HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }
}

/// Seconds since the epoch, integral or fractional.
fn numeric_date(value: &Number) -> Option<DateTime<Utc>> {
    if let Some(secs) = value.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }
    let secs = value.as_f64()?;
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

fn to_numeric_date(instant: DateTime<Utc>) -> Number {
    let millis = instant.timestamp_millis();
    if millis % 1000 == 0 {
        Number::from(millis / 1000)
    } else {
        Number::from_f64(millis as f64 / 1000.0).unwrap_or_else(|| Number::from(millis / 1000))
    }
}

fn claim_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(UNSIGNED_HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let claims = ClaimSet::expiring_at(instant(1_700_000_600))
            .with_subject("ana@example.com")
            .with_role("ADMIN");

        let decoded = CredentialCodec::decode(&CredentialCodec::encode(&claims));
        assert_eq!(decoded, Decoded::Valid(claims));
    }

    #[test]
    fn test_roundtrip_keeps_milliseconds() {
        let expires_at = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();
        let claims = ClaimSet::expiring_at(expires_at);

        let decoded = CredentialCodec::decode(&CredentialCodec::encode(&claims));
        assert_eq!(decoded.expires_at(), Some(expires_at));
    }

    #[test]
    fn test_builder_truncates_to_milliseconds() {
        let precise = Utc.timestamp_opt(1_700_000_000, 250_400_700).unwrap();
        let claims = ClaimSet::expiring_at(precise)
            .with_issued_at(precise)
            .with_token_id("mint-1");

        assert_eq!(claims.expires_at, Utc.timestamp_millis_opt(1_700_000_000_250).unwrap());
        let decoded = CredentialCodec::decode(&CredentialCodec::encode(&claims));
        assert_eq!(decoded, Decoded::Valid(claims));
    }

    #[test]
    fn test_token_id_distinguishes_same_claims() {
        let claims = ClaimSet::expiring_at(instant(1_700_000_600)).with_role("ADMIN");

        let first = CredentialCodec::encode(&claims.clone().with_token_id("1"));
        let second = CredentialCodec::encode(&claims.with_token_id("2"));

        assert_ne!(first, second);
        assert_eq!(
            CredentialCodec::decode(&first).expires_at(),
            CredentialCodec::decode(&second).expires_at()
        );
    }

    #[test]
    fn test_decode_garbage_is_invalid() {
        for garbage in [
            "",
            "not-a-token",
            "a.b",
            "a.b.c.d",
            "header.%%%.sig",
            "header.bm90IGpzb24.sig",
        ] {
            let decoded = CredentialCodec::decode(garbage);
            assert_eq!(decoded, Decoded::Invalid, "input: {garbage:?}");
            assert!(decoded.is_expired(instant(0)));
            assert!(decoded.expires_within(instant(0), Duration::from_secs(1)));
            assert_eq!(
                decoded.assess(instant(0), Duration::from_secs(300)),
                Freshness::Expired
            );
        }
    }

    #[test]
    fn test_decode_without_exp_is_invalid() {
        let token = token_with_payload(r#"{"sub":"ana","role":"ADMIN"}"#);
        assert_eq!(CredentialCodec::decode(&token), Decoded::Invalid);
    }

    #[test]
    fn test_decode_accepts_padded_payload_and_float_exp() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":1700000000.5}"#);
        let token = format!("h.{payload}.s");

        let decoded = CredentialCodec::decode(&token);
        assert_eq!(
            decoded.expires_at(),
            Some(Utc.timestamp_millis_opt(1_700_000_000_500).unwrap())
        );
    }

    #[test]
    fn test_decode_reads_role_and_numeric_subject() {
        let token = token_with_payload(r#"{"exp":1700000000,"sub":42,"role":"CUSTOMER"}"#);

        let decoded = CredentialCodec::decode(&token);
        assert_eq!(decoded.role(), Some("CUSTOMER"));
        assert_eq!(decoded.claims().unwrap().subject.as_deref(), Some("42"));
    }

    #[test]
    fn test_is_expired_boundary() {
        let decoded = Decoded::Valid(ClaimSet::expiring_at(instant(1000)));

        assert!(!decoded.is_expired(instant(999)));
        assert!(decoded.is_expired(instant(1000)));
        assert!(decoded.is_expired(instant(1001)));
    }

    #[test]
    fn test_expires_within_is_strict() {
        let decoded = Decoded::Valid(ClaimSet::expiring_at(instant(1300)));
        let threshold = Duration::from_secs(300);

        assert!(!decoded.expires_within(instant(1000), threshold));
        assert!(decoded.expires_within(instant(1001), threshold));
        // Already past expiry still counts as inside the threshold
        assert!(decoded.expires_within(instant(2000), threshold));
    }

    #[test]
    fn test_assess() {
        let decoded = Decoded::Valid(ClaimSet::expiring_at(instant(1000)));
        let threshold = Duration::from_secs(300);

        assert_eq!(decoded.assess(instant(0), threshold), Freshness::Fresh);
        assert_eq!(decoded.assess(instant(700), threshold), Freshness::Fresh);
        assert_eq!(
            decoded.assess(instant(970), threshold),
            Freshness::Renewable {
                remaining: chrono::Duration::seconds(30)
            }
        );
        assert_eq!(decoded.assess(instant(1000), threshold), Freshness::Expired);
        assert!(Freshness::Expired.needs_refresh());
        assert!(!Freshness::Fresh.needs_refresh());
    }
}
