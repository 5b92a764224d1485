// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

use derive_more::Display;

/// A digest algorithm tracked for every stored blob.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Display)]
pub enum Algorithm {
    #[display("md5")]
    MD5,
    #[display("sha1")]
    SHA1,
    #[display("sha256")]
    SHA256,
    #[display("sha512")]
    SHA512,
}

impl Algorithm {
    pub(crate) const LARGEST: Algorithm = Algorithm::SHA512;

    /// Digest length in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            Algorithm::MD5 => 16,
            Algorithm::SHA1 => 20,
            Algorithm::SHA256 => 32,
            Algorithm::SHA512 => 64,
        }
    }

    /// Resolve a user supplied algorithm selector.
    ///
    /// Matching is case-insensitive. Anything that is not one of the four
    /// known names, including the empty string, selects [`Algorithm::SHA512`].
    ///
    /// ```
    /// # use depot_utils_hash::Algorithm;
    /// assert_eq!(Algorithm::from_selector("SHA1"), Algorithm::SHA1);
    /// assert_eq!(Algorithm::from_selector(""), Algorithm::SHA512);
    /// assert_eq!(Algorithm::from_selector("blake3"), Algorithm::SHA512);
    /// ```
    pub fn from_selector(selector: &str) -> Algorithm {
        [Algorithm::MD5, Algorithm::SHA1, Algorithm::SHA256]
            .into_iter()
            .find(|algorithm| selector.eq_ignore_ascii_case(&algorithm.to_string()))
            .unwrap_or(Algorithm::SHA512)
    }
}
