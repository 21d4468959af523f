//! Key identifier derivation.

use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256};

/// Derive a stable key id from public key material.
///
/// SHA-256 over the material, base64url encoded without padding. The same
/// material always yields the same 43-character id.
pub fn derive_key_id(public_material: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(public_material))
}
