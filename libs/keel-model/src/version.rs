//! Platform version parsing and comparison
//!
//! Versions follow the restricted grammar `vMAJOR[.MINOR[.REVISION]]`. Missing
//! fields default to zero. Pre-release and build suffixes are not accepted.

use crate::error::{ModelError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Precision at which two versions are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonLevel {
    Main,
    Sub,
    Revision,
}

/// Parsed `vMAJOR.MINOR.REVISION`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub main: u64,
    pub sub: u64,
    pub revision: u64,
}

impl Version {
    pub const fn new(main: u64, sub: u64, revision: u64) -> Self {
        Self {
            main,
            sub,
            revision,
        }
    }

    /// Parse a version string such as `v1`, `v1.2` or `v1.2.3`
    pub fn parse(input: &str) -> Result<Self> {
        let malformed = || ModelError::MalformedVersion(input.to_string());

        let body = input.strip_prefix('v').ok_or_else(malformed)?;
        let mut fields = [0u64; 3];
        let mut count = 0;
        for part in body.split('.') {
            if count == fields.len() {
                return Err(malformed());
            }
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            fields[count] = part.parse().map_err(|_| malformed())?;
            count += 1;
        }

        Ok(Self::new(fields[0], fields[1], fields[2]))
    }

    /// Compare `self` against `other` down to `level`
    ///
    /// A more significant field that differs decides the result even when a
    /// coarser level was requested.
    pub fn compare(&self, other: &Self, level: ComparisonLevel) -> Ordering {
        if self.main != other.main || level == ComparisonLevel::Main {
            return self.main.cmp(&other.main);
        }
        if self.sub != other.sub || level == ComparisonLevel::Sub {
            return self.sub.cmp(&other.sub);
        }
        self.revision.cmp(&other.revision)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.main, self.sub, self.revision)
    }
}

impl FromStr for Version {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Compare two version strings at `level`, returning -1, 0 or 1
pub fn compare(a: &str, b: &str, level: ComparisonLevel) -> Result<i8> {
    let a = Version::parse(a)?;
    let b = Version::parse(b)?;
    Ok(match a.compare(&b, level) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

/// Whether a caller built against `caller` may use something requiring `dependency`
///
/// The caller must be at least the dependency at MAJOR.MINOR precision.
/// Revision differences never block.
pub fn is_compatible(dependency: &str, caller: &str) -> Result<bool> {
    Ok(compare(caller, dependency, ComparisonLevel::Sub)? >= 0)
}
