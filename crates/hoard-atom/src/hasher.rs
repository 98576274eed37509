/// Domain-separated BLAKE3 hasher for atom content.
///
/// The hash covers the content length and every byte, so binary payloads
/// with embedded NULs hash (and deduplicate) correctly. Only the first eight
/// bytes of the digest are kept: the value selects a hash chain, and chain
/// members are always compared byte-for-byte.
pub struct AtomHasher {
    domain: &'static str,
}

impl AtomHasher {
    /// Hasher used by [`AtomStore`](crate::AtomStore).
    pub const ATOM: Self = Self {
        domain: "hoard-atom-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash content bytes to a chain index.
    pub fn hash(&self, data: &[u8]) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(&(data.len() as u64).to_le_bytes());
        hasher.update(data);
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(word)
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
