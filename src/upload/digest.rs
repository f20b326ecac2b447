//! Content digests
//!
//! B2 verifies every upload against a hex SHA-1 of its bytes, and
//! `b2_finish_large_file` takes the per-part SHA-1 list in part order.

use sha1::{Digest, Sha1};

/// Hex-encoded SHA-1 of `data`
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Compare a locally computed digest with one reported by B2
pub fn digests_match(local: &str, remote: &str) -> bool {
    local.eq_ignore_ascii_case(remote)
}
