//! Webhook delivery: HMAC-SHA256 request signing, signature verification,
//! and exponential-backoff retry on delivery failure.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default tolerance, in seconds, between a signature's timestamp and the
/// verifier's clock before the signature is rejected as stale.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn hmac_hex(secret: &str, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message);
    hex_encode(&mac.finalize().into_bytes())
}

/// Signs `body` with `secret` over the body alone, returning the canonical
/// `sha256=<hex>` header value.
pub fn sign(body: &str, secret: &str) -> String {
    format!("sha256={}", hmac_hex(secret, body.as_bytes()))
}

/// Signs `body` with `secret` and `timestamp`, returning the optional
/// `t=<unix_seconds>,sha256=<hex>` header form, where the signed message is
/// `"{timestamp}.{body}"`.
pub fn sign_with_timestamp(body: &str, secret: &str, timestamp: u64) -> String {
    let message = format!("{}.{}", timestamp, body);
    format!("t={},sha256={}", timestamp, hmac_hex(secret, message.as_bytes()))
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp is outside the allowed tolerance")]
    Stale,
    #[error("signature does not match")]
    Mismatch,
}

/// Verifies an `X-Webhook-Signature` header against `body`. Accepts both
/// the canonical `sha256=<hex>` form (HMAC over the body alone) and the
/// optional `t=<unix_seconds>,sha256=<hex>` form, rejecting the latter if
/// its timestamp falls outside `tolerance` relative to `now`.
pub fn verify(
    header: &str,
    body: &str,
    secret: &str,
    now: u64,
    tolerance: Duration,
) -> Result<(), VerifyError> {
    let mut timestamp_field: Option<&str> = None;
    let mut signature: Option<&str> = None;
    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp_field = Some(v),
            (Some("sha256"), Some(v)) => signature = Some(v),
            _ => {}
        }
    }
    let signature = signature.ok_or(VerifyError::Malformed)?;

    let expected = match timestamp_field {
        Some(v) => {
            let timestamp: u64 = v.parse().map_err(|_| VerifyError::Malformed)?;
            let delta = now.abs_diff(timestamp);
            if delta > tolerance.as_secs() {
                return Err(VerifyError::Stale);
            }
            sign_with_timestamp(body, secret, timestamp)
        }
        None => sign(body, secret),
    };
    let expected_sig = expected.rsplit("sha256=").next().unwrap_or("");
    if constant_time_eq(expected_sig, signature) {
        Ok(())
    } else {
        Err(VerifyError::Mismatch)
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook delivery failed after {attempts} attempt(s): {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },
}

/// Delivers `payload` as a signed JSON POST to `url`, retrying with
/// exponential backoff (base 1s, factor 2, capped at 30s) up to
/// `max_retries` additional times after the first attempt.
pub fn deliver<T: Serialize>(
    url: &str,
    payload: &T,
    secret: &str,
    timeout: Duration,
    max_retries: u32,
) -> Result<(), DeliveryError> {
    let body = serde_json::to_string(payload).expect("JobResult always serializes");
    let mut last_error = String::new();

    for attempt in 0..=max_retries {
        let mut request = ureq::post(url).timeout(timeout);
        if !secret.is_empty() {
            let header = sign(&body, secret);
            request = request.set("X-Webhook-Signature", &header);
        }
        match request.send_string(&body) {
            Ok(_) => return Ok(()),
            Err(e) => {
                last_error = e.to_string();
                log::warn!(
                    "webhook delivery to {} failed (attempt {}/{}): {}",
                    url,
                    attempt + 1,
                    max_retries + 1,
                    last_error
                );
                if attempt < max_retries {
                    let backoff = Duration::from_secs(1u64 << attempt).min(Duration::from_secs(30));
                    std::thread::sleep(backoff);
                }
            }
        }
    }
    Err(DeliveryError::ExhaustedRetries {
        attempts: max_retries + 1,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_form_sign_then_verify_round_trips() {
        let body = r#"{"job_id":"j1"}"#;
        let secret = "topsecret";
        let header = sign(body, secret);
        assert!(!header.contains("t="));
        assert!(verify(&header, body, secret, 0, Duration::from_secs(DEFAULT_TOLERANCE_SECS)).is_ok());
    }

    #[test]
    fn timestamped_form_sign_then_verify_round_trips() {
        let body = r#"{"job_id":"j1"}"#;
        let secret = "topsecret";
        let now = 1_700_000_000u64;
        let header = sign_with_timestamp(body, secret, now);
        assert!(verify(&header, body, secret, now, Duration::from_secs(DEFAULT_TOLERANCE_SECS)).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_body_in_base_form() {
        let body = r#"{"job_id":"j1"}"#;
        let secret = "topsecret";
        let header = sign(body, secret);
        let tampered = r#"{"job_id":"j2"}"#;
        assert!(matches!(
            verify(&header, tampered, secret, 0, Duration::from_secs(300)),
            Err(VerifyError::Mismatch)
        ));
    }

    #[test]
    fn verify_rejects_stale_timestamp() {
        let body = "hello";
        let secret = "topsecret";
        let header = sign_with_timestamp(body, secret, 1_000);
        let result = verify(&header, body, secret, 10_000, Duration::from_secs(300));
        assert!(matches!(result, Err(VerifyError::Stale)));
    }

    #[test]
    fn verify_rejects_malformed_header() {
        let result = verify("garbage", "body", "secret", 0, Duration::from_secs(300));
        assert!(matches!(result, Err(VerifyError::Malformed)));
    }
}
