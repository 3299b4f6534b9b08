use chrono::{DateTime, Utc};
use rollcall_core::{PairingToken, PairingTokenValidator, TokenError};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("Pairing code rejected: {0}")]
    InvalidToken(#[from] TokenError),
}

/// A pairing code that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paired {
    pub token: PairingToken,
    /// Only legacy codes name the issuing device.
    pub device_id: Option<String>,
}

/// Gate in front of the sync loop for interactively scanned codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairingFlow {
    validator: PairingTokenValidator,
}

impl PairingFlow {
    pub fn new(validator: PairingTokenValidator) -> Self {
        Self { validator }
    }

    pub fn accept(&self, raw: &str, now: DateTime<Utc>) -> Result<Paired, PairingError> {
        let token = self.validator.check_raw(raw.trim(), now).map_err(|e| {
            warn!("Rejected pairing code: {}", e);
            PairingError::InvalidToken(e)
        })?;
        let device_id = match &token {
            PairingToken::Uuid(_) => None,
            PairingToken::Legacy(legacy) => Some(legacy.device_id.clone()),
        };
        info!(
            "Paired with {}",
            device_id.as_deref().unwrap_or("session code")
        );
        Ok(Paired { token, device_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rollcall_core::token::issue_legacy_token;

    #[test]
    fn fresh_legacy_code_pairs_with_device() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let code = issue_legacy_token("gate-1", now - Duration::seconds(30));
        let paired = PairingFlow::default()
            .accept(&format!("  {code}\n"), now)
            .unwrap();
        assert_eq!(paired.device_id.as_deref(), Some("gate-1"));
    }

    #[test]
    fn stale_code_is_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let code = issue_legacy_token("gate-1", now - Duration::minutes(6));
        let err = PairingFlow::default().accept(&code, now).unwrap_err();
        assert!(matches!(
            err,
            PairingError::InvalidToken(TokenError::Stale { .. })
        ));
    }

    #[test]
    fn uuid_code_has_no_device() {
        let now = Utc::now();
        let paired = PairingFlow::default()
            .accept("123e4567-e89b-12d3-a456-426614174000", now)
            .unwrap();
        assert_eq!(paired.device_id, None);
    }
}
