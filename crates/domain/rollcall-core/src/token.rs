//! Pairing credentials scanned from an optical code.
//!
//! Two shapes are accepted: a canonical UUID, and the legacy
//! `"<deviceId>:<epochMillis>:<digest>"` form whose digest is an uppercase
//! hex MD5 of `"<deviceId>:<epochMillis>"`. The digest is keyless, so this
//! confirms device proximity only; it is not an authentication boundary.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

const UUID_PATTERN: &str =
    "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";

fn is_uuid_shaped(raw: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UUID_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(raw))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is missing the deviceId:timestamp:hash separators")]
    MissingSeparator,
    #[error("token device id is blank")]
    BlankDeviceId,
    #[error("token hash is blank")]
    BlankHash,
    #[error("token timestamp '{0}' is not an integer")]
    InvalidTimestamp(String),
    #[error("token is stale ({age_ms} ms old)")]
    Stale { age_ms: i64 },
    #[error("token is dated {ahead_ms} ms in the future")]
    FutureDated { ahead_ms: i64 },
    #[error("token digest does not match")]
    DigestMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyToken {
    pub device_id: String,
    pub issued_at_ms: i64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingToken {
    /// Carries no timestamp, so no freshness check applies.
    Uuid(String),
    Legacy(LegacyToken),
}

impl PairingToken {
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        if is_uuid_shaped(raw) {
            return Ok(PairingToken::Uuid(raw.to_string()));
        }

        let (rest, hash) = raw.rsplit_once(':').ok_or(TokenError::MissingSeparator)?;
        let (device_id, timestamp) = rest.rsplit_once(':').ok_or(TokenError::MissingSeparator)?;

        if device_id.trim().is_empty() {
            return Err(TokenError::BlankDeviceId);
        }
        if hash.trim().is_empty() {
            return Err(TokenError::BlankHash);
        }
        let issued_at_ms = timestamp
            .parse::<i64>()
            .map_err(|_| TokenError::InvalidTimestamp(timestamp.to_string()))?;

        Ok(PairingToken::Legacy(LegacyToken {
            device_id: device_id.to_string(),
            issued_at_ms,
            hash: hash.to_string(),
        }))
    }
}

/// Digest shared by the issuing and validating side.
pub fn legacy_digest(device_id: &str, issued_at_ms: i64) -> String {
    let mut hasher = md5::Context::new();
    hasher.consume(format!("{device_id}:{issued_at_ms}").as_bytes());
    format!("{:X}", hasher.finalize())
}

pub fn issue_legacy_token(device_id: &str, now: DateTime<Utc>) -> String {
    let ts = now.timestamp_millis();
    format!("{device_id}:{ts}:{}", legacy_digest(device_id, ts))
}

#[derive(Debug, Clone, Copy)]
pub struct PairingTokenValidator {
    max_age_ms: i64,
    max_skew_ms: i64,
}

impl Default for PairingTokenValidator {
    fn default() -> Self {
        Self::new(
            rollcall_config::TOKEN_MAX_AGE,
            rollcall_config::TOKEN_MAX_SKEW,
        )
    }
}

impl PairingTokenValidator {
    pub fn new(max_age: std::time::Duration, max_skew: std::time::Duration) -> Self {
        Self {
            max_age_ms: i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX),
            max_skew_ms: i64::try_from(max_skew.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn validate(&self, raw: &str, now: DateTime<Utc>) -> bool {
        self.check_raw(raw, now).is_ok()
    }

    pub fn check_raw(&self, raw: &str, now: DateTime<Utc>) -> Result<PairingToken, TokenError> {
        let token = PairingToken::parse(raw)?;
        self.check(&token, now)?;
        Ok(token)
    }

    pub fn check(&self, token: &PairingToken, now: DateTime<Utc>) -> Result<(), TokenError> {
        match token {
            PairingToken::Uuid(_) => Ok(()),
            PairingToken::Legacy(legacy) => self.check_legacy(legacy, now),
        }
    }

    fn check_legacy(&self, token: &LegacyToken, now: DateTime<Utc>) -> Result<(), TokenError> {
        // Only timestamps near the ends of the i64 range overflow here.
        let age_ms = match now.timestamp_millis().checked_sub(token.issued_at_ms) {
            Some(age_ms) => age_ms,
            None if token.issued_at_ms < 0 => i64::MAX,
            None => i64::MIN,
        };
        if age_ms > self.max_age_ms {
            return Err(TokenError::Stale { age_ms });
        }
        if age_ms < -self.max_skew_ms {
            return Err(TokenError::FutureDated {
                ahead_ms: age_ms.checked_neg().unwrap_or(i64::MAX),
            });
        }

        // Issuers emit uppercase hex; anything else is not their digest.
        if legacy_digest(&token.device_id, token.issued_at_ms) != token.hash {
            return Err(TokenError::DigestMismatch);
        }
        Ok(())
    }
}
