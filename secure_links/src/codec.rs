use nanoid::nanoid;
use sha2::{Digest, Sha256};

pub const SECURE_ID_LEN: usize = 16;
pub const HASH_PREFIX_LEN: usize = 8;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The three path segments of a secure url, `/secure/{id}/{timestamp}/{hash}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurePath {
    pub secure_id: String,
    pub timestamp: String,
    pub hash: String,
}

impl SecurePath {
    /// Derives a fresh path for a backing object. The timestamp segment is
    /// only there for uniqueness and debuggability; the hash binds it to the
    /// object so neither segment can be swapped independently.
    pub fn derive(bucket: &str, key: &str, now_millis: u64) -> Self {
        let timestamp = encode_base36(now_millis);
        let hash = integrity_hash(bucket, key, &timestamp);
        Self {
            secure_id: generate_secure_id(),
            timestamp,
            hash,
        }
    }

    pub fn to_uri_path(&self) -> String {
        format!("/secure/{}/{}/{}", self.secure_id, self.timestamp, self.hash)
    }

    /// Recomputes the hash from the stored object identity and the presented
    /// timestamp, and compares byte for byte against the presented hash.
    pub fn verify(bucket: &str, key: &str, timestamp: &str, presented_hash: &str) -> bool {
        integrity_hash(bucket, key, timestamp) == presented_hash
    }
}

/// Cryptographically random, url-safe, 16 characters.
pub fn generate_secure_id() -> String {
    nanoid!(SECURE_ID_LEN)
}

/// First 8 hex characters of SHA-256 over `bucket || key || timestamp`.
pub fn integrity_hash(bucket: &str, key: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bucket.as_bytes());
    hasher.update(key.as_bytes());
    hasher.update(timestamp.as_bytes());
    hex::encode(hasher.finalize())[..HASH_PREFIX_LEN].to_string()
}

pub fn encode_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap()
}

pub fn decode_base36(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for c in s.bytes() {
        let digit = match c {
            b'0'..=b'9' => (c - b'0') as u64,
            b'a'..=b'z' => (c - b'a') as u64 + 10,
            _ => return None,
        };
        value = value.checked_mul(36)?.checked_add(digit)?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36_round_trip() {
        for millis in [0u64, 1, 35, 36, 1_700_000_000_000, u64::MAX] {
            assert_eq!(decode_base36(&encode_base36(millis)), Some(millis));
        }
    }

    #[test]
    fn test_base36_rejects_garbage() {
        assert_eq!(decode_base36(""), None);
        assert_eq!(decode_base36("not base36!"), None);
        assert_eq!(decode_base36("ZZZZ"), None); // uppercase is not in the alphabet
    }

    #[test]
    fn test_secure_id_shape() {
        let id = generate_secure_id();
        assert_eq!(id.len(), SECURE_ID_LEN);
        assert_ne!(id, generate_secure_id());
    }

    #[test]
    fn test_integrity_hash_is_stable_and_short() {
        let h1 = integrity_hash("photos", "cat.png", "abc123");
        let h2 = integrity_hash("photos", "cat.png", "abc123");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), HASH_PREFIX_LEN);
        assert!(h1.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_binds_all_inputs() {
        let base = integrity_hash("photos", "cat.png", "abc123");
        assert_ne!(base, integrity_hash("photos2", "cat.png", "abc123"));
        assert_ne!(base, integrity_hash("photos", "dog.png", "abc123"));
        assert_ne!(base, integrity_hash("photos", "cat.png", "abc124"));
    }

    #[test]
    fn test_derive_and_verify() {
        let path = SecurePath::derive("photos", "cat.png", 1_700_000_000_000);
        assert!(SecurePath::verify(
            "photos",
            "cat.png",
            &path.timestamp,
            &path.hash
        ));
        assert_eq!(
            path.to_uri_path(),
            format!(
                "/secure/{}/{}/{}",
                path.secure_id, path.timestamp, path.hash
            )
        );
    }

    #[test]
    fn test_verify_rejects_wrong_timestamp() {
        let path = SecurePath::derive("photos", "cat.png", 1_700_000_000_000);
        assert!(!SecurePath::verify(
            "photos",
            "cat.png",
            "different",
            &path.hash
        ));
    }
}
