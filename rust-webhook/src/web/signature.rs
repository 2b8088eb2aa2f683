//! LINE webhook signature verification.
//!
//! LINE signs every webhook request body with HMAC-SHA256 keyed by the
//! channel secret and sends the base64 digest in `X-Line-Signature`.
//! Reference: https://developers.line.biz/en/reference/messaging-api/#signature-validation

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Compute the base64-encoded HMAC-SHA256 signature of `body`.
pub fn compute_line_signature(
    channel_secret: &[u8],
    body: &[u8],
) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(channel_secret)?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a LINE webhook signature.
///
/// # Arguments
///
/// * `channel_secret` - The channel secret from the LINE developers console
/// * `body` - The raw, unparsed request body
/// * `signature` - The value of the `X-Line-Signature` header
///
/// # Returns
///
/// `true` if `signature` is exactly the base64 HMAC-SHA256 of `body`,
/// `false` otherwise (including empty or non-base64 input).
pub fn verify_line_signature(channel_secret: &[u8], body: &[u8], signature: &str) -> bool {
    if signature.is_empty() {
        warn!(body_length = body.len(), "line_signature_missing");
        return false;
    }

    let expected_signature = match compute_line_signature(channel_secret, body) {
        Ok(s) => s,
        Err(_) => {
            warn!("line_signature_invalid_key");
            return false;
        }
    };

    let valid = constant_time_compare(&expected_signature, signature);

    if !valid {
        warn!(
            expected_length = expected_signature.len(),
            actual_length = signature.len(),
            "line_signature_mismatch"
        );
        // Exposes the expected digest; only visible with RUST_LOG=debug.
        debug!(
            claimed = %signature,
            expected = %expected_signature,
            "line_signature_mismatch_detail"
        );
    }

    valid
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
