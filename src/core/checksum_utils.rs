/*
 * Provides SHA256 digests for the payloads written to the local catalog files.
 * The persistence codec stores the digest next to each payload and compares it on
 * load, so a truncated or partially overwritten file is reported as corrupt even
 * when its bytes still happen to decode.
 */
use sha2::{Digest, Sha256};

// Hex-encoded SHA256 of `bytes`.
pub fn calculate_sha256_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hex_checksum = format!("{:x}", hasher.finalize());
    log::trace!(
        "ChecksumUtils: Calculated checksum {} over {} byte(s)",
        hex_checksum,
        bytes.len()
    );
    hex_checksum
}

pub fn checksum_matches(bytes: &[u8], expected: &str) -> bool {
    calculate_sha256_checksum(bytes).eq_ignore_ascii_case(expected)
}
