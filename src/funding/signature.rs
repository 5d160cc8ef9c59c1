//! Webhook signatures: hex HMAC-SHA512 of the raw request body.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::error::LedgerError;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

pub fn compute_signature(secret: &str, body: &[u8]) -> Result<String, LedgerError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| LedgerError::internal(format!("invalid HMAC key: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of `signature` against the expected digest.
/// A missing or malformed signature is simply `false`.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Ok(expected) = compute_signature(secret, body) else {
        return false;
    };
    let expected_bytes = expected.as_bytes();
    let signature_bytes = signature.trim().as_bytes();
    if expected_bytes.len() != signature_bytes.len() {
        return false;
    }
    expected_bytes.ct_eq(signature_bytes).into()
}
