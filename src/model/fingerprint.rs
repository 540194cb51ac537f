use crate::url::canonicalize;
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Deduplication key of a request
///
/// SHA-256 over the upper-cased method and the canonical URL. Two requests
/// with equal fingerprints name the same resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(method: &Method, url: &Url) -> Self {
        let canonical = canonicalize(url);

        let mut hasher = Sha256::new();
        hasher.update(method.as_str().to_ascii_uppercase().as_bytes());
        hasher.update(b" ");
        hasher.update(canonical.as_str().as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}
