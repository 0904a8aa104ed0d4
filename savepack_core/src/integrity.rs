use sha1::{Digest, Sha1};

/// SHA-1 digest of `bytes`.
pub fn sha1_digest(bytes: &[u8]) -> [u8; 20] {
    let digest = Sha1::digest(bytes);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// Lowercase hex rendering of a digest.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
