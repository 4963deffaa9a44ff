//! Commit references: relative offsets or literal identifiers.

use std::fmt;
use std::str::FromStr;

/// A point in a worktree's history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommitRef {
    /// `N` commits behind the worktree's current HEAD. `0` is HEAD itself.
    Offset(u32),
    /// Commit hash or symbolic ref, passed to git verbatim.
    Id(String),
}

impl CommitRef {
    pub const HEAD: Self = Self::Offset(0);

    /// The revision string handed to git.
    pub fn resolve(&self) -> String {
        match self {
            Self::Offset(n) => format!("HEAD~{n}"),
            Self::Id(id) => id.clone(),
        }
    }
}

impl Default for CommitRef {
    fn default() -> Self {
        Self::HEAD
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolve())
    }
}

impl From<u32> for CommitRef {
    fn from(n: u32) -> Self {
        Self::Offset(n)
    }
}

impl From<&str> for CommitRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for CommitRef {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

/// Short all-digit strings are offsets; anything else (including 7+ digit
/// abbreviated hashes) is an identifier.
impl FromStr for CommitRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.len() < 7 && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = s.parse() {
                return Ok(Self::Offset(n));
            }
        }
        Ok(Self::Id(s.to_string()))
    }
}
