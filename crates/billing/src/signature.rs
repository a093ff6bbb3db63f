//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header looks like `t=1492774577,v1=5257a8...,v0=...`.
//! Each `v1` value is a hex HMAC-SHA256 of `"{t}.{payload}"` keyed with the
//! endpoint secret. Several `v1` values appear while a secret is being rolled.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{BillingError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default maximum age of a signed event.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    BillingError::InvalidSignature("timestamp is not a number".to_string())
                })?);
            }
            "v1" => {
                // Undecodable entries can't match; skip them.
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| BillingError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(BillingError::InvalidSignature(
            "no v1 signatures".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn mac_for(payload: &[u8], timestamp: i64, secret: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Config("webhook secret is unusable".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verify a webhook payload against its `Stripe-Signature` header.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<()> {
    let parsed = parse_header(header)?;

    let mac = mac_for(payload, parsed.timestamp, secret)?;
    let matched = parsed
        .signatures
        .iter()
        .any(|signature| mac.clone().verify_slice(signature).is_ok());

    if !matched {
        return Err(BillingError::InvalidSignature(
            "no signature matches the payload".to_string(),
        ));
    }

    let age_secs = now - parsed.timestamp;
    if tolerance_secs > 0 && age_secs.abs() > tolerance_secs {
        return Err(BillingError::TimestampOutOfTolerance { age_secs });
    }

    Ok(())
}

/// Build a `Stripe-Signature` header for a payload.
///
/// Used to sign test fixtures and local replays.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mac = mac_for(payload, timestamp, secret)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={},v1={}", timestamp, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_741_000_000;
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"invoice.paid"}"#;

    #[test]
    fn test_valid_signature() {
        let header = sign_payload(PAYLOAD, SECRET, NOW).unwrap();
        assert!(verify_signature(PAYLOAD, &header, SECRET, NOW + 5, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let good = sign_payload(PAYLOAD, SECRET, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={},v0=ignored", NOW, "ab".repeat(32), good_sig);
        assert!(verify_signature(PAYLOAD, &header, SECRET, NOW, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = sign_payload(PAYLOAD, SECRET, NOW).unwrap();
        let result = verify_signature(b"{}", &header, SECRET, NOW, DEFAULT_TOLERANCE_SECS);
        assert!(matches!(result, Err(BillingError::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let header = sign_payload(PAYLOAD, "whsec_other", NOW).unwrap();
        let result = verify_signature(PAYLOAD, &header, SECRET, NOW, DEFAULT_TOLERANCE_SECS);
        assert!(matches!(result, Err(BillingError::InvalidSignature(_))));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let header = sign_payload(PAYLOAD, SECRET, NOW).unwrap();
        let result = verify_signature(PAYLOAD, &header, SECRET, NOW + 301, DEFAULT_TOLERANCE_SECS);
        assert!(matches!(
            result,
            Err(BillingError::TimestampOutOfTolerance { age_secs: 301 })
        ));

        // Zero tolerance disables the age check
        assert!(verify_signature(PAYLOAD, &header, SECRET, NOW + 10_000, 0).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        for header in ["", "v1=abcd", "t=abc,v1=abcd", "t=123", "t=123,v1=zz"] {
            let result = verify_signature(PAYLOAD, header, SECRET, NOW, DEFAULT_TOLERANCE_SECS);
            assert!(
                matches!(result, Err(BillingError::InvalidSignature(_))),
                "header {:?} should be rejected",
                header
            );
        }
    }
}
