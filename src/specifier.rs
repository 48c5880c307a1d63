//! Target specifier parsing for `Owner#member` / `Owner.member` expressions
//!
//! `#` names an instance-scoped member, `.` an owner-scoped one. Owner paths
//! may be nested with `::` (e.g. `Net::Http::Client#get`).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub use crate::namespace::MemberKind;

/// Specifier parsing errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecifierError {
    #[error("malformed specifier {raw:?}: {reason}. Expected OWNER#MEMBER or OWNER.MEMBER")]
    MalformedSpecifier { raw: String, reason: &'static str },
}

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(r"^([^#.:\s]+(?:::[^#.:\s]+)*)([#.])([^#.\s]+)$")
            .expect("specifier grammar is a valid regex")
    })
}

/// Parsed description of the member to instrument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetSpec {
    owner: String,
    kind: MemberKind,
    member: String,
    raw: String,
}

impl TargetSpec {
    /// Parse a raw specifier like `Counter#increment` or `A::B.build`
    pub fn parse(raw: &str) -> Result<Self, SpecifierError> {
        let raw = raw.trim();
        let malformed = |reason| SpecifierError::MalformedSpecifier {
            raw: raw.to_string(),
            reason,
        };

        if raw.is_empty() {
            return Err(malformed("empty specifier"));
        }
        let separators = raw.chars().filter(|c| *c == '#' || *c == '.').count();
        if separators == 0 {
            return Err(malformed("missing '#' or '.' separator"));
        }
        if separators > 1 {
            return Err(malformed("more than one separator"));
        }

        let caps = grammar()
            .captures(raw)
            .ok_or_else(|| malformed("owner path and member name must be non-empty"))?;

        let kind = if &caps[2] == "#" {
            MemberKind::InstanceScoped
        } else {
            MemberKind::OwnerScoped
        };

        Ok(Self {
            owner: caps[1].to_string(),
            kind,
            member: caps[3].to_string(),
            raw: raw.to_string(),
        })
    }

    /// Owner path, e.g. `A::B`
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    /// The specifier exactly as given (trimmed)
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Individual `::` segments of the owner path
    pub fn owner_segments(&self) -> impl Iterator<Item = &str> {
        self.owner.split("::")
    }
}

impl FromStr for TargetSpec {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
