// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Digest utilities for Depot.
//!
//! Every blob stored in a Depot registry is identified by its size plus four
//! independent digests (MD5, SHA-1, SHA-256, SHA-512). This crate provides
//! the combined [`BlobDigests`] value and [`MultiHasher`], an incremental
//! hasher whose running state can be saved to bytes and restored later so a
//! chunked upload can resume after a process restart without re-reading the
//! bytes it already received.

use std::fmt;

mod algo;
pub mod hashing_reader;
mod multi;

pub use algo::Algorithm;
pub use multi::{BlobDigests, InvalidHashState, MultiHasher};

/// A finished digest of one algorithm.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Hash {
    algorithm: Algorithm,
    data: [u8; Algorithm::LARGEST.size()],
}

impl Hash {
    /// `digest` must be exactly `algorithm.size()` bytes long.
    pub(crate) const fn new(algorithm: Algorithm, digest: &[u8]) -> Hash {
        let mut data = [0u8; Algorithm::LARGEST.size()];
        let (head, _) = data.split_at_mut(algorithm.size());
        head.copy_from_slice(digest);
        Hash { algorithm, data }
    }

    #[inline]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.data[..self.algorithm.size()]
    }

    /// Lowercase hex encoding of the digest, as stored in the blob table.
    pub fn to_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

/// Formats as `algorithm:hex`, e.g. `sha256:ba7816bf...`.
impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

#[cfg(test)]
mod unittests {
    use hex_literal::hex;
    use rstest::rstest;

    use super::*;

    const LONG_INPUT: &str = "abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq";

    fn digest_of(algorithm: Algorithm, input: &str) -> Hash {
        let digests = BlobDigests::compute(input);
        match algorithm {
            Algorithm::MD5 => digests.md5,
            Algorithm::SHA1 => digests.sha1,
            Algorithm::SHA256 => digests.sha256,
            Algorithm::SHA512 => digests.sha512,
        }
    }

    // Vectors from RFC 1321, RFC 3174 and RFC 4634.
    #[rstest]
    #[case::md5_empty(Algorithm::MD5, "", &hex!("d41d8cd98f00b204e9800998ecf8427e"))]
    #[case::md5_abc(Algorithm::MD5, "abc", &hex!("900150983cd24fb0d6963f7d28e17f72"))]
    #[case::sha1_abc(Algorithm::SHA1, "abc", &hex!("a9993e364706816aba3e25717850c26c9cd0d89d"))]
    #[case::sha1_long(Algorithm::SHA1, LONG_INPUT, &hex!("84983e441c3bd26ebaae4aa1f95129e5e54670f1"))]
    #[case::sha256_abc(
        Algorithm::SHA256,
        "abc",
        &hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    )]
    #[case::sha256_long(
        Algorithm::SHA256,
        LONG_INPUT,
        &hex!("248d6a61d20638b8e5c026930c3e6039a33ce45964ff2167f6ecedd419db06c1")
    )]
    #[case::sha512_abc(
        Algorithm::SHA512,
        "abc",
        &hex!(
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        )
    )]
    fn known_digests(#[case] algorithm: Algorithm, #[case] input: &str, #[case] expected: &[u8]) {
        let actual = digest_of(algorithm, input);
        assert_eq!(actual.algorithm(), algorithm);
        assert_eq!(actual.digest_bytes(), expected);
        assert_eq!(actual.digest_bytes().len(), algorithm.size());
    }

    #[rstest]
    #[case::md5("md5", Algorithm::MD5)]
    #[case::sha1("sha1", Algorithm::SHA1)]
    #[case::sha256("sha256", Algorithm::SHA256)]
    #[case::sha512("sha512", Algorithm::SHA512)]
    #[case::md5_mixed("Md5", Algorithm::MD5)]
    #[case::sha256_upper("SHA256", Algorithm::SHA256)]
    #[case::empty("", Algorithm::SHA512)]
    #[case::unknown("blake3", Algorithm::SHA512)]
    #[case::sha384("sha384", Algorithm::SHA512)]
    #[case::whitespace(" sha1", Algorithm::SHA512)]
    fn selector(#[case] input: &str, #[case] expected: Algorithm) {
        assert_eq!(Algorithm::from_selector(input), expected);
    }

    #[test]
    fn display_is_prefixed_hex() {
        let hash = digest_of(Algorithm::MD5, "abc");
        assert_eq!(hash.to_string(), "md5:900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(format!("{hash:?}"), "Hash(md5:900150983cd24fb0d6963f7d28e17f72)");
    }
}
