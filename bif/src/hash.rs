//! content hashes
//!
//! A content hash is the hex encoded digest of an entity's derived content. It doubles as
//! the change detection key for derived data, so it is always a cryptographic digest.
use core::fmt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256};
use std::str::FromStr;

const SEED: &[u8] = b"ripemd160";

/// Digest function used for content hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// 224 bit SHA-2, the default
    Sha224,
    /// 224 bit SHA-2 fed with `ripemd160` before any content, as the first BIF tools did
    Sha224Seeded,
    Sha256,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha224
    }
}

impl HashAlgorithm {
    pub fn hasher(self) -> ContentHasher {
        match self {
            Self::Sha224 => ContentHasher::Sha224(Sha224::new()),
            Self::Sha224Seeded => ContentHasher::Sha224(Sha224::new_with_prefix(SEED)),
            Self::Sha256 => ContentHasher::Sha256(Sha256::new()),
        }
    }

    /// digest of a single buffer
    pub fn digest(self, data: &[u8]) -> ContentHash {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// digest of the given hashes joined by `-`. A missing hash contributes the empty string.
    pub fn combine<'a>(self, hashes: impl IntoIterator<Item = Option<&'a ContentHash>>) -> ContentHash {
        let mut hasher = self.hasher();
        for (i, hash) in hashes.into_iter().enumerate() {
            if i > 0 {
                hasher.update(b"-");
            }
            if let Some(hash) = hash {
                hasher.update(hash.as_str().as_bytes());
            }
        }
        hasher.finalize()
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha224" => Ok(Self::Sha224),
            "sha224-seeded" => Ok(Self::Sha224Seeded),
            "sha256" => Ok(Self::Sha256),
            _ => Err(format!("unknown hash algorithm {}", s)),
        }
    }
}

/// Running digest, fed incrementally
pub enum ContentHasher {
    Sha224(Sha224),
    Sha256(Sha256),
}

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha224(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> ContentHash {
        let hex = match self {
            Self::Sha224(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
        };
        ContentHash(hex)
    }
}

/// Hex encoded digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the serialized form, where the empty string means "no hash"
    pub(crate) fn from_stored(text: &str) -> Option<Self> {
        if text.is_empty() {
            None
        } else {
            Some(Self(text.to_owned()))
        }
    }

    /// The serialized form, where `None` is stored as the empty string
    pub(crate) fn to_stored(hash: Option<&ContentHash>) -> String {
        hash.map(|x| x.0.clone()).unwrap_or_default()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn known_digests() {
        assert_eq!(
            HashAlgorithm::Sha224.digest(b"").as_str(),
            "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f"
        );
        assert_eq!(
            HashAlgorithm::Sha256.digest(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn seeded_digest_is_prefixed() {
        assert_eq!(
            HashAlgorithm::Sha224Seeded.digest(b"abc"),
            HashAlgorithm::Sha224.digest(b"ripemd160abc")
        );
        let mut hasher = HashAlgorithm::Sha224Seeded.hasher();
        hasher.update(b"ab");
        hasher.update(b"c");
        assert_eq!(hasher.finalize(), HashAlgorithm::Sha224Seeded.digest(b"abc"));
        assert_ne!(
            HashAlgorithm::Sha224Seeded.digest(b""),
            HashAlgorithm::Sha224.digest(b"")
        );
    }

    #[test]
    fn combine_joins_with_dash() {
        let a = HashAlgorithm::Sha224.digest(b"a");
        let b = HashAlgorithm::Sha224.digest(b"b");
        let joined = format!("{}-{}", a, b);
        assert_eq!(
            HashAlgorithm::Sha224.combine(vec![Some(&a), Some(&b)]),
            HashAlgorithm::Sha224.digest(joined.as_bytes())
        );
        let with_missing = format!("{}-", a);
        assert_eq!(
            HashAlgorithm::Sha224.combine(vec![Some(&a), None]),
            HashAlgorithm::Sha224.digest(with_missing.as_bytes())
        );
        assert_eq!(
            HashAlgorithm::Sha224.combine(Vec::new()),
            HashAlgorithm::Sha224.digest(b"")
        );
    }

    #[test]
    fn stored_form() {
        assert_eq!(ContentHash::from_stored(""), None);
        let h = HashAlgorithm::Sha256.digest(b"x");
        assert_eq!(ContentHash::from_stored(h.as_str()), Some(h.clone()));
        assert_eq!(ContentHash::to_stored(None), "");
        assert_eq!(ContentHash::to_stored(Some(&h)), h.as_str());
    }

    #[test]
    fn parse_algorithm() {
        assert_eq!("SHA224".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha224));
        assert_eq!("sha256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert_eq!("sha224-seeded".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha224Seeded));
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[quickcheck]
    fn incremental_equals_oneshot(chunks: Vec<Vec<u8>>) -> bool {
        let mut hasher = HashAlgorithm::Sha224.hasher();
        for chunk in &chunks {
            hasher.update(chunk);
        }
        hasher.finalize() == HashAlgorithm::Sha224.digest(&chunks.concat())
    }
}
