// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Lenient semantic version parsing.
//!
//! Accepts what publishers actually upload: an optional `v` prefix, any
//! number of numeric segments (missing ones count as zero), a pre-release
//! part with or without a leading `-`, and `+build` metadata.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^v?(?P<segments>[0-9]+(?:\.[0-9]+)*?)(?:-(?P<pre_num>[0-9]+[0-9A-Za-z\-~]*(?:\.[0-9A-Za-z\-~]+)*)|-?(?P<pre_alpha>[A-Za-z\-~]+[0-9A-Za-z\-~]*(?:\.[0-9A-Za-z\-~]+)*))?(?:\+(?P<metadata>[0-9A-Za-z\-~]+(?:\.[0-9A-Za-z\-~]+)*))?$",
    )
    .unwrap_or_else(|e| panic!("version pattern is valid: {e}"))
});

/// A parsed version. Ordering ignores build metadata.
#[derive(Debug, Clone)]
pub struct SemVer {
    segments: Vec<u64>,
    prerelease: String,
    metadata: String,
    original: String,
}

impl SemVer {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let caps = VERSION_RE
            .captures(input)
            .ok_or_else(|| Error::InvalidVersion(input.to_owned()))?;

        let mut segments = caps["segments"]
            .split('.')
            .map(|s| s.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidVersion(input.to_owned()))?;
        while segments.len() < 3 {
            segments.push(0);
        }

        let prerelease = caps
            .name("pre_num")
            .or_else(|| caps.name("pre_alpha"))
            .map_or("", |m| m.as_str());

        Ok(SemVer {
            segments,
            prerelease: prerelease.to_owned(),
            metadata: caps.name("metadata").map_or("", |m| m.as_str()).to_owned(),
            original: input.to_owned(),
        })
    }

    pub fn major(&self) -> u64 {
        self.segments[0]
    }

    pub fn minor(&self) -> u64 {
        self.segments[1]
    }

    pub fn patch(&self) -> u64 {
        self.segments[2]
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn prerelease(&self) -> &str {
        &self.prerelease
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// The input string as given to [`parse`](Self::parse).
    pub fn original(&self) -> &str {
        &self.original
    }
}

fn compare_prerelease_part(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        // A release sorts after any of its pre-releases.
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let mut left = a.split('.');
            let mut right = b.split('.');
            loop {
                match (left.next(), right.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(l), Some(r)) => match compare_prerelease_part(l, r) {
                        Ordering::Equal => continue,
                        other => return other,
                    },
                }
            }
        }
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let l = self.segments.get(i).copied().unwrap_or(0);
            let r = other.segments.get(i).copied().unwrap_or(0);
            match l.cmp(&r) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        compare_prerelease(&self.prerelease, &other.prerelease)
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemVer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemVer {}

impl FromStr for SemVer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SemVer::parse(s)
    }
}

/// Canonical form, `major.minor.patch[-pre][+meta]`.
impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments: Vec<String> = self.segments.iter().map(u64::to_string).collect();
        f.write_str(&segments.join("."))?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease)?;
        }
        if !self.metadata.is_empty() {
            write!(f, "+{}", self.metadata)?;
        }
        Ok(())
    }
}
