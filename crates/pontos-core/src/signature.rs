// Webhook signature verification for the Alfred payment gateway
//
// The gateway signs every delivery with HMAC-SHA256 over the raw request
// body and sends the digest as a hex string, optionally prefixed with the
// algorithm name. Verification never panics or errors on malformed input:
// every outcome is a typed result the caller can audit.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm label reported on every verification result.
pub const SIGNATURE_ALGORITHM: &str = "hmac-sha256";

/// Prefixes some gateway versions prepend to the hex digest.
const SIGNATURE_PREFIXES: [&str; 3] = ["sha256=", "sha1=", "hmac-sha256="];

/// Outcome of verifying a webhook signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureCheck {
    pub is_valid: bool,
    /// Why verification failed (or was skipped), for the audit log.
    pub reason: Option<String>,
    pub algorithm: &'static str,
}

impl SignatureCheck {
    fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
            algorithm: SIGNATURE_ALGORITHM,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            reason: Some(reason.into()),
            algorithm: SIGNATURE_ALGORITHM,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
            algorithm: SIGNATURE_ALGORITHM,
        }
    }
}

/// Computes the HMAC-SHA256 signature of a payload as lowercase hex.
pub fn compute_signature(secret: &str, raw_body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a webhook signature against the raw request body.
///
/// The provided signature may carry an algorithm prefix (`sha256=`,
/// `sha1=`, `hmac-sha256=`) and upper- or lowercase hex; both are
/// normalized before comparison. The digest comparison is constant-time.
///
/// A missing secret fails closed unless `allow_unsigned` is set; honoring
/// that override only outside production-like environments is the
/// caller's responsibility.
pub fn verify_signature(
    secret: Option<&str>,
    raw_body: &[u8],
    provided: Option<&str>,
    allow_unsigned: bool,
) -> SignatureCheck {
    let secret = match secret {
        Some(s) if !s.is_empty() => s,
        _ => {
            if allow_unsigned {
                return SignatureCheck::skipped("no webhook secret configured, unsigned allowed");
            }
            return SignatureCheck::invalid("no webhook secret configured");
        }
    };

    let provided = match provided.map(str::trim) {
        Some(p) if !p.is_empty() => p,
        _ => return SignatureCheck::invalid("missing signature"),
    };

    // Strip a single known algorithm prefix, if any.
    let hex_digest = SIGNATURE_PREFIXES
        .iter()
        .find_map(|prefix| provided.strip_prefix(prefix))
        .unwrap_or(provided)
        .to_ascii_lowercase();

    if hex_digest.is_empty() || !hex_digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return SignatureCheck::invalid("signature is not a hex string");
    }

    let digest = match hex::decode(&hex_digest) {
        Ok(bytes) => bytes,
        Err(_) => return SignatureCheck::invalid("signature is not a hex string"),
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(raw_body);

    // verify_slice rejects wrong-length digests and compares in constant
    // time, which defeats timing probes against the expected digest.
    match mac.verify_slice(&digest) {
        Ok(()) => SignatureCheck::valid(),
        Err(_) => SignatureCheck::invalid("signature does not match payload"),
    }
}
