/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::version
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Parse apk package version strings into a structured form
    and order them, defining what "newest" means for mirroring.

  Security / Safety Notes:
    Pure computation; no I/O and no global state.

  Dependencies:
    thiserror for parse diagnostics.

  Operational Scope:
    Consumed by the selector when reducing an index to the
    latest record per package name.

  Revision History:
    2026-10-18 COD  Native comparator replacing vercmp calls.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Invalid input rejected at parse time, never ranked
    - Total order with deterministic ties
============================================================*/

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Failure to parse a version string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("version `{input}`: expected digit at byte {position}")]
    ExpectedDigit { input: String, position: usize },
    #[error("version `{input}`: unknown suffix `_{suffix}`")]
    UnknownSuffix { input: String, suffix: String },
    #[error("version `{input}`: unexpected `{rest}` at byte {position}")]
    TrailingInput {
        input: String,
        position: usize,
        rest: String,
    },
    #[error("version `{input}`: numeric component `{digits}` out of range")]
    Overflow { input: String, digits: String },
}

/// Suffix keywords, declared in ascending rank.
///
/// Everything before `Cvs` sorts below a bare release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    Alpha,
    Beta,
    Pre,
    Rc,
    Cvs,
    Svn,
    Git,
    Hg,
    P,
}

impl Suffix {
    const ALL: [Suffix; 9] = [
        Suffix::Alpha,
        Suffix::Beta,
        Suffix::Pre,
        Suffix::Rc,
        Suffix::Cvs,
        Suffix::Svn,
        Suffix::Git,
        Suffix::Hg,
        Suffix::P,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Suffix::Alpha => "alpha",
            Suffix::Beta => "beta",
            Suffix::Pre => "pre",
            Suffix::Rc => "rc",
            Suffix::Cvs => "cvs",
            Suffix::Svn => "svn",
            Suffix::Git => "git",
            Suffix::Hg => "hg",
            Suffix::P => "p",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        Suffix::ALL.into_iter().find(|s| s.keyword() == word)
    }

    /// Rank relative to "no suffix", which is zero.
    fn rank(self) -> i8 {
        match self {
            Suffix::Alpha => -4,
            Suffix::Beta => -3,
            Suffix::Pre => -2,
            Suffix::Rc => -1,
            Suffix::Cvs => 1,
            Suffix::Svn => 2,
            Suffix::Git => 3,
            Suffix::Hg => 4,
            Suffix::P => 5,
        }
    }
}

/// One `_<keyword><counter>` group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuffixGroup {
    pub suffix: Suffix,
    /// Absent counters parse as zero.
    pub counter: u64,
}

impl SuffixGroup {
    fn key(&self) -> (i8, u64) {
        (self.suffix.rank(), self.counter)
    }
}

/// Parsed package version.
///
/// Equality is equality of rank: `1.0` and `1.0.0` compare equal.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    numbers: Vec<u64>,
    letter: Option<char>,
    suffixes: Vec<SuffixGroup>,
    revision: u64,
}

impl Version {
    /// Parse a version such as `1.2.3b_rc2_p1-r4`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        if input.is_empty() {
            return Err(VersionError::Empty);
        }
        let mut cursor = Cursor::new(input);

        let mut numbers = vec![cursor.number()?];
        while cursor.eat('.') {
            numbers.push(cursor.number()?);
        }

        let letter = cursor.peek().filter(char::is_ascii_lowercase);
        if letter.is_some() {
            cursor.bump();
        }

        let mut suffixes = Vec::new();
        while cursor.eat('_') {
            let word = cursor.take_while(|c| c.is_ascii_lowercase());
            let suffix = Suffix::from_keyword(word).ok_or_else(|| VersionError::UnknownSuffix {
                input: input.to_string(),
                suffix: word.to_string(),
            })?;
            let counter = if cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
                cursor.number()?
            } else {
                0
            };
            suffixes.push(SuffixGroup { suffix, counter });
        }

        let revision = if cursor.eat_str("-r") {
            cursor.number()?
        } else {
            0
        };

        cursor.finish()?;

        Ok(Self {
            raw: input.to_string(),
            numbers,
            letter,
            suffixes,
            revision,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_padded(&self.numbers, &other.numbers, |n| *n, 0)
            .then_with(|| self.letter.cmp(&other.letter))
            .then_with(|| compare_padded(&self.suffixes, &other.suffixes, SuffixGroup::key, (0, 0)))
            .then_with(|| self.revision.cmp(&other.revision))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn compare_padded<T, K: Ord + Copy>(
    left: &[T],
    right: &[T],
    key: impl Fn(&T) -> K,
    missing: K,
) -> Ordering {
    let len = left.len().max(right.len());
    (0..len)
        .map(|idx| {
            let a = left.get(idx).map(&key).unwrap_or(missing);
            let b = right.get(idx).map(&key).unwrap_or(missing);
            a.cmp(&b)
        })
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn number(&mut self) -> Result<u64, VersionError> {
        let start = self.pos;
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(VersionError::ExpectedDigit {
                input: self.input.to_string(),
                position: start,
            });
        }
        digits.parse().map_err(|_| VersionError::Overflow {
            input: self.input.to_string(),
            digits: digits.to_string(),
        })
    }

    fn finish(&self) -> Result<(), VersionError> {
        if self.pos == self.input.len() {
            Ok(())
        } else {
            Err(VersionError::TrailingInput {
                input: self.input.to_string(),
                position: self.pos,
                rest: self.rest().to_string(),
            })
        }
    }
}
