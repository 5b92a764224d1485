// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Four-way incremental hashing with a persistable running state.

use md5::Md5;
use sha1::Sha1;
use sha2::digest::Digest;
use sha2::digest::common::hazmat::{SerializableState, SerializedState};
use sha2::digest::typenum::Unsigned;
use sha2::{Sha256, Sha512};
use thiserror::Error;

use crate::{Algorithm, Hash};

/// Layout version of [`MultiHasher::save_state`] output.
const STATE_VERSION: u8 = 1;

const MD5_STATE_LEN: usize = <Md5 as SerializableState>::SerializedStateSize::USIZE;
const SHA1_STATE_LEN: usize = <Sha1 as SerializableState>::SerializedStateSize::USIZE;
const SHA256_STATE_LEN: usize = <Sha256 as SerializableState>::SerializedStateSize::USIZE;
const SHA512_STATE_LEN: usize = <Sha512 as SerializableState>::SerializedStateSize::USIZE;

/// Total length of a saved state: version byte, byte counter, four digest states.
const STATE_LEN: usize =
    1 + 8 + MD5_STATE_LEN + SHA1_STATE_LEN + SHA256_STATE_LEN + SHA512_STATE_LEN;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum InvalidHashState {
    #[error("hash state has wrong length {0} != {STATE_LEN}")]
    Length(usize),
    #[error("unsupported hash state version {0}")]
    Version(u8),
    #[error("corrupt {0} state")]
    Corrupt(Algorithm),
    #[error("hash state covers {hashed} bytes but {recorded} were recorded")]
    ByteCount { hashed: u64, recorded: u64 },
}

/// The four digests that, together with the size, identify a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobDigests {
    pub md5: Hash,
    pub sha1: Hash,
    pub sha256: Hash,
    pub sha512: Hash,
}

impl BlobDigests {
    /// Hash `data` in one go.
    pub fn compute<B: AsRef<[u8]>>(data: B) -> Self {
        let mut hasher = MultiHasher::new();
        hasher.update(data.as_ref());
        hasher.finish().1
    }
}

/// Computes MD5, SHA-1, SHA-256 and SHA-512 over the same byte stream.
///
/// The running state (including bytes buffered inside each digest) can be
/// exported with [`save_state`](Self::save_state) and re-imported with
/// [`restore_state`](Self::restore_state). A restored hasher continues
/// exactly where the saved one stopped.
///
/// ```
/// use depot_utils_hash::{BlobDigests, MultiHasher};
///
/// let mut first = MultiHasher::new();
/// first.update(b"hello, ");
/// let saved = first.save_state();
///
/// let mut resumed = MultiHasher::restore_state(&saved).unwrap();
/// resumed.update(b"world");
/// let (size, digests) = resumed.finish();
///
/// assert_eq!(size, 12);
/// assert_eq!(digests, BlobDigests::compute(b"hello, world"));
/// ```
#[derive(Clone)]
pub struct MultiHasher {
    size: u64,
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    sha512: Sha512,
}

impl Default for MultiHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MultiHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiHasher")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl MultiHasher {
    pub fn new() -> Self {
        Self {
            size: 0,
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            sha512: Sha512::new(),
        }
    }

    /// Number of bytes hashed so far.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.md5, data);
        Digest::update(&mut self.sha1, data);
        Digest::update(&mut self.sha256, data);
        Digest::update(&mut self.sha512, data);
        self.size += data.len() as u64;
    }

    /// Consume the hasher, returning the byte count and the four digests.
    pub fn finish(self) -> (u64, BlobDigests) {
        let digests = BlobDigests {
            md5: Hash::new(Algorithm::MD5, self.md5.finalize().as_slice()),
            sha1: Hash::new(Algorithm::SHA1, self.sha1.finalize().as_slice()),
            sha256: Hash::new(Algorithm::SHA256, self.sha256.finalize().as_slice()),
            sha512: Hash::new(Algorithm::SHA512, self.sha512.finalize().as_slice()),
        };
        (self.size, digests)
    }

    /// Serialize the running state. The output never contains hashed data
    /// beyond what each digest keeps in its partial block buffer.
    pub fn save_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STATE_LEN);
        out.push(STATE_VERSION);
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(self.md5.serialize().as_slice());
        out.extend_from_slice(self.sha1.serialize().as_slice());
        out.extend_from_slice(self.sha256.serialize().as_slice());
        out.extend_from_slice(self.sha512.serialize().as_slice());
        out
    }

    /// Rebuild a hasher from [`save_state`](Self::save_state) output.
    pub fn restore_state(state: &[u8]) -> Result<Self, InvalidHashState> {
        if state.len() != STATE_LEN {
            return Err(InvalidHashState::Length(state.len()));
        }
        if state[0] != STATE_VERSION {
            return Err(InvalidHashState::Version(state[0]));
        }

        let mut size = [0u8; 8];
        size.copy_from_slice(&state[1..9]);

        let rest = &state[9..];
        let (md5, rest) = rest.split_at(MD5_STATE_LEN);
        let (sha1, rest) = rest.split_at(SHA1_STATE_LEN);
        let (sha256, sha512) = rest.split_at(SHA256_STATE_LEN);

        Ok(Self {
            size: u64::from_le_bytes(size),
            md5: restore::<Md5>(md5, Algorithm::MD5)?,
            sha1: restore::<Sha1>(sha1, Algorithm::SHA1)?,
            sha256: restore::<Sha256>(sha256, Algorithm::SHA256)?,
            sha512: restore::<Sha512>(sha512, Algorithm::SHA512)?,
        })
    }
}

fn restore<D: SerializableState>(bytes: &[u8], algorithm: Algorithm) -> Result<D, InvalidHashState> {
    let serialized = SerializedState::<D>::try_from(bytes)
        .map_err(|_| InvalidHashState::Corrupt(algorithm))?;
    D::deserialize(&serialized).map_err(|_| InvalidHashState::Corrupt(algorithm))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_input_matches_known_digests() {
        let digests = BlobDigests::compute(b"");
        assert_eq!(digests.md5.to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            digests.sha1.to_hex(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(
            digests.sha256.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(digests.sha512.algorithm(), Algorithm::SHA512);
    }

    #[test]
    fn saved_state_has_fixed_length() {
        let mut hasher = MultiHasher::new();
        assert_eq!(hasher.save_state().len(), STATE_LEN);
        hasher.update(&[7u8; 1000]);
        assert_eq!(hasher.save_state().len(), STATE_LEN);
    }

    #[test]
    fn rejects_truncated_state() {
        let state = MultiHasher::new().save_state();
        assert_eq!(
            MultiHasher::restore_state(&state[..10]).unwrap_err(),
            InvalidHashState::Length(10)
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let mut state = MultiHasher::new().save_state();
        state[0] = 99;
        assert_eq!(
            MultiHasher::restore_state(&state).unwrap_err(),
            InvalidHashState::Version(99)
        );
    }

    proptest! {
        #[test]
        fn resumed_hashing_matches_one_shot(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let mut offsets: Vec<usize> = cuts.iter().map(|c| c.index(data.len() + 1)).collect();
            offsets.sort_unstable();

            let mut state = MultiHasher::new().save_state();
            let mut start = 0;
            for end in offsets.into_iter().chain(std::iter::once(data.len())) {
                let mut hasher = MultiHasher::restore_state(&state).unwrap();
                hasher.update(&data[start..end]);
                state = hasher.save_state();
                start = end;
            }

            let (size, digests) = MultiHasher::restore_state(&state).unwrap().finish();
            prop_assert_eq!(size, data.len() as u64);
            prop_assert_eq!(digests, BlobDigests::compute(&data));
        }
    }
}
