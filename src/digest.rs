//! Stored digests of archive entries.
//!
//! Checksum-bearing formats (mtree) carry per-entry digests keyed by the name of
//! the hash algorithm.  [`StoredDigests`] is the uniform in-memory form: a map
//! from [`DigestAlgorithm`] to the raw digest bytes, whose length is fixed by
//! the algorithm.  Formats without digests simply leave it empty.

use std::{collections::BTreeMap, fmt, str::FromStr};

use hex::FromHexError;
use sha2::Digest;

use crate::error::{Error, Result};

/// The fixed set of hash algorithms an entry digest can use.
///
/// The declaration order is the order in which digests are written to mtree files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    Md5,
    Rmd160,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// All supported algorithms, in write order.
    pub const ALL: [DigestAlgorithm; 6] = [
        DigestAlgorithm::Md5,
        DigestAlgorithm::Rmd160,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];

    /// The algorithm name ("md5", "sha256", ...).
    pub const fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Rmd160 => "rmd160",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Size of a digest in bytes.
    pub const fn digest_size(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 16,
            DigestAlgorithm::Rmd160 | DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// The keyword used when writing this digest to an mtree file.
    pub const fn mtree_keyword(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5digest",
            DigestAlgorithm::Rmd160 => "rmd160digest",
            DigestAlgorithm::Sha1 => "sha1digest",
            DigestAlgorithm::Sha256 => "sha256digest",
            DigestAlgorithm::Sha384 => "sha384digest",
            DigestAlgorithm::Sha512 => "sha512digest",
        }
    }

    /// Maps any of the mtree keywords for a digest to its algorithm.
    pub fn from_mtree_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "md5" | "md5digest" => DigestAlgorithm::Md5,
            "rmd160" | "rmd160digest" | "ripemd160digest" => DigestAlgorithm::Rmd160,
            "sha1" | "sha1digest" => DigestAlgorithm::Sha1,
            "sha256" | "sha256digest" => DigestAlgorithm::Sha256,
            "sha384" | "sha384digest" => DigestAlgorithm::Sha384,
            "sha512" | "sha512digest" => DigestAlgorithm::Sha512,
            _ => return None,
        })
    }

    /// Looks an algorithm up by name.
    ///
    /// Unknown names fail with [`Error::UnsupportedDigest`].
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnsupportedDigest {
                algorithm: name.to_string(),
                format: "any",
            })
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Digests attached to one entry: algorithm -> raw digest bytes.
///
/// Every stored blob has exactly [`DigestAlgorithm::digest_size()`] bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredDigests(BTreeMap<DigestAlgorithm, Box<[u8]>>);

impl StoredDigests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from algorithm names and raw digests.
    ///
    /// Fails with [`Error::UnsupportedDigest`] for unknown names and with
    /// [`Error::InvalidEntry`] for digests of the wrong length.
    pub fn from_named<I, K, V>(digests: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let mut result = Self::new();
        for (name, value) in digests {
            result.insert(DigestAlgorithm::from_name(name.as_ref())?, value.as_ref())?;
        }
        Ok(result)
    }

    /// Stores a digest, replacing any previous value for the algorithm.
    pub fn insert(&mut self, algorithm: DigestAlgorithm, digest: &[u8]) -> Result<()> {
        if digest.len() != algorithm.digest_size() {
            return Err(Error::InvalidEntry(format!(
                "{algorithm} digest must be {} bytes, got {}",
                algorithm.digest_size(),
                digest.len()
            )));
        }
        self.0.insert(algorithm, Box::from(digest));
        Ok(())
    }

    /// Stores a digest given in hexadecimal.
    pub fn insert_hex(
        &mut self,
        algorithm: DigestAlgorithm,
        hex: impl AsRef<[u8]>,
    ) -> std::result::Result<(), FromHexError> {
        let mut value = vec![0u8; algorithm.digest_size()];
        hex::decode_to_slice(hex.as_ref(), &mut value)?;
        self.0.insert(algorithm, value.into_boxed_slice());
        Ok(())
    }

    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<&[u8]> {
        self.0.get(&algorithm).map(|value| &**value)
    }

    /// The digest as lower-case hexadecimal.
    pub fn get_hex(&self, algorithm: DigestAlgorithm) -> Option<String> {
        self.get(algorithm).map(hex::encode)
    }

    pub fn contains(&self, algorithm: DigestAlgorithm) -> bool {
        self.0.contains_key(&algorithm)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in [`DigestAlgorithm`] order.
    pub fn iter(&self) -> impl Iterator<Item = (DigestAlgorithm, &[u8])> {
        self.0.iter().map(|(algorithm, value)| (*algorithm, &**value))
    }

    pub fn algorithms(&self) -> impl Iterator<Item = DigestAlgorithm> + '_ {
        self.0.keys().copied()
    }

    /// The mapping keyed by algorithm name.
    pub fn to_named(&self) -> BTreeMap<&'static str, Vec<u8>> {
        self.iter()
            .map(|(algorithm, value)| (algorithm.name(), value.to_vec()))
            .collect()
    }
}

/// Incremental computation of one digest over streamed entry content.
pub enum Hasher {
    Md5(md5::Md5),
    Rmd160(ripemd::Ripemd160),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl Hasher {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Hasher::Md5(md5::Md5::new()),
            DigestAlgorithm::Rmd160 => Hasher::Rmd160(ripemd::Ripemd160::new()),
            DigestAlgorithm::Sha1 => Hasher::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha384 => Hasher::Sha384(sha2::Sha384::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(sha2::Sha512::new()),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            Hasher::Md5(_) => DigestAlgorithm::Md5,
            Hasher::Rmd160(_) => DigestAlgorithm::Rmd160,
            Hasher::Sha1(_) => DigestAlgorithm::Sha1,
            Hasher::Sha256(_) => DigestAlgorithm::Sha256,
            Hasher::Sha384(_) => DigestAlgorithm::Sha384,
            Hasher::Sha512(_) => DigestAlgorithm::Sha512,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Rmd160(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Box<[u8]> {
        match self {
            Hasher::Md5(h) => h.finalize().to_vec().into(),
            Hasher::Rmd160(h) => h.finalize().to_vec().into(),
            Hasher::Sha1(h) => h.finalize().to_vec().into(),
            Hasher::Sha256(h) => h.finalize().to_vec().into(),
            Hasher::Sha384(h) => h.finalize().to_vec().into(),
            Hasher::Sha512(h) => h.finalize().to_vec().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_sizes_match_hashers() {
        for algorithm in DigestAlgorithm::ALL {
            let hasher = Hasher::new(algorithm);
            assert_eq!(hasher.algorithm(), algorithm);
            assert_eq!(hasher.finalize().len(), algorithm.digest_size());
        }
    }

    #[test]
    fn test_known_values() {
        let mut hasher = Hasher::new(DigestAlgorithm::Sha256);
        hasher.update(b"hello");
        assert_eq!(
            hex::encode(hasher.finalize()),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let hasher = Hasher::new(DigestAlgorithm::Md5);
        assert_eq!(
            hex::encode(hasher.finalize()),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_keywords() {
        for algorithm in DigestAlgorithm::ALL {
            assert_eq!(
                DigestAlgorithm::from_mtree_keyword(algorithm.mtree_keyword()),
                Some(algorithm)
            );
            assert_eq!(
                DigestAlgorithm::from_mtree_keyword(algorithm.name()),
                Some(algorithm)
            );
        }
        assert_eq!(
            DigestAlgorithm::from_mtree_keyword("ripemd160digest"),
            Some(DigestAlgorithm::Rmd160)
        );
        assert_eq!(DigestAlgorithm::from_mtree_keyword("crc"), None);
    }

    #[test]
    fn test_from_named() {
        let digests = StoredDigests::from_named([("md5", [0x21; 16]), ("SHA1", [0x21; 16])]);
        assert!(matches!(digests, Err(Error::InvalidEntry(_))));

        let digests = StoredDigests::from_named([("whirlpool", [0u8; 64])]);
        assert!(matches!(
            digests,
            Err(Error::UnsupportedDigest { ref algorithm, .. }) if algorithm == "whirlpool"
        ));

        let digests =
            StoredDigests::from_named([("sha256", vec![1u8; 32]), ("md5", vec![2u8; 16])]).unwrap();
        let order: Vec<_> = digests.algorithms().collect();
        assert_eq!(order, [DigestAlgorithm::Md5, DigestAlgorithm::Sha256]);
        assert_eq!(digests.get(DigestAlgorithm::Md5), Some(&[2u8; 16][..]));
        assert_eq!(digests.get(DigestAlgorithm::Sha1), None);
    }

    #[test]
    fn test_hex() {
        let mut digests = StoredDigests::new();
        digests
            .insert_hex(DigestAlgorithm::Sha1, "21".repeat(20))
            .unwrap();
        assert_eq!(digests.get(DigestAlgorithm::Sha1), Some(&[b'!'; 20][..]));
        assert_eq!(digests.get_hex(DigestAlgorithm::Sha1), Some("21".repeat(20)));

        assert_eq!(
            digests.insert_hex(DigestAlgorithm::Md5, "2121"),
            Err(FromHexError::InvalidStringLength)
        );
        assert_eq!(digests.len(), 1);
    }
}
