//! Pure synchronous hashing
//!
//! Every identity derived in Warden (participant hashes, account ids) goes
//! through [`hash`] or [`hasher`], so the algorithm is declared exactly once.
//!
//! Current algorithm: **SHA-256** (32-byte output)

use sha2::{Digest, Sha256};

/// Incremental hasher over the workspace algorithm
#[derive(Debug, Clone, Default)]
pub struct Hasher(Sha256);

impl Hasher {
    /// Feed more bytes into the digest
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.0.update(data);
        self
    }

    /// Consume the hasher and return the 32-byte digest
    pub fn finalize(self) -> [u8; 32] {
        let result = self.0.finalize();
        let mut output = [0u8; 32];
        output.copy_from_slice(&result);
        output
    }
}

/// Hash bytes with the workspace algorithm
#[inline]
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut h = hasher();
    h.update(data);
    h.finalize()
}

/// Create an incremental hasher
#[inline]
pub fn hasher() -> Hasher {
    Hasher::default()
}
