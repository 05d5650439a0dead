//! Path-encoding rulesets.
//!
//! A ruleset names the character classes that must be escaped before a path
//! or name is sent to the remote. Rulesets are written as a comma-separated
//! list of rule names, e.g.
//! `"Slash,LtGt,DoubleQuote,Ctl,Dot"`. Names are matched case-insensitively.
//!
//! This module only describes *which* rules are active. Applying them is the
//! job of the storage crate's codec.

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The default ruleset for Cloudinary remotes.
pub const DEFAULT_ENCODING: &str =
    "Slash,LtGt,DoubleQuote,Question,Asterisk,Pipe,Hash,Percent,BackSlash,Del,Ctl,RightSpace,InvalidUtf8,Dot";

/// A single escaping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncodingRule {
    /// NUL bytes.
    Zero,
    /// `/` inside a name.
    Slash,
    /// `<` and `>`.
    LtGt,
    /// `"`
    DoubleQuote,
    /// `'`
    SingleQuote,
    /// `` ` ``
    BackQuote,
    /// `$`
    Dollar,
    /// `:`
    Colon,
    /// `?`
    Question,
    /// `*`
    Asterisk,
    /// `|`
    Pipe,
    /// `#`
    Hash,
    /// `%`
    Percent,
    /// `\`
    BackSlash,
    /// `;`
    Semicolon,
    /// `!`
    Exclamation,
    /// `[` and `]`.
    SquareBracket,
    /// The DEL control character (0x7F).
    Del,
    /// Control characters 0x01 to 0x1F.
    Ctl,
    /// A leading space.
    LeftSpace,
    /// A trailing space.
    RightSpace,
    /// A trailing period.
    RightPeriod,
    /// Invalid UTF-8. Names are always valid UTF-8 once they are Rust strings,
    /// so this rule is accepted for compatibility and has no effect.
    InvalidUtf8,
    /// The names `.` and `..`.
    Dot,
}

impl EncodingRule {
    /// Every rule, in declaration order.
    pub const ALL: [EncodingRule; 24] = [
        Self::Zero,
        Self::Slash,
        Self::LtGt,
        Self::DoubleQuote,
        Self::SingleQuote,
        Self::BackQuote,
        Self::Dollar,
        Self::Colon,
        Self::Question,
        Self::Asterisk,
        Self::Pipe,
        Self::Hash,
        Self::Percent,
        Self::BackSlash,
        Self::Semicolon,
        Self::Exclamation,
        Self::SquareBracket,
        Self::Del,
        Self::Ctl,
        Self::LeftSpace,
        Self::RightSpace,
        Self::RightPeriod,
        Self::InvalidUtf8,
        Self::Dot,
    ];

    /// Rules that are always active, whatever the configured ruleset says.
    pub const BASE: [EncodingRule; 3] = [Self::Zero, Self::Slash, Self::Dot];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Zero => "Zero",
            Self::Slash => "Slash",
            Self::LtGt => "LtGt",
            Self::DoubleQuote => "DoubleQuote",
            Self::SingleQuote => "SingleQuote",
            Self::BackQuote => "BackQuote",
            Self::Dollar => "Dollar",
            Self::Colon => "Colon",
            Self::Question => "Question",
            Self::Asterisk => "Asterisk",
            Self::Pipe => "Pipe",
            Self::Hash => "Hash",
            Self::Percent => "Percent",
            Self::BackSlash => "BackSlash",
            Self::Semicolon => "Semicolon",
            Self::Exclamation => "Exclamation",
            Self::SquareBracket => "SquareBracket",
            Self::Del => "Del",
            Self::Ctl => "Ctl",
            Self::LeftSpace => "LeftSpace",
            Self::RightSpace => "RightSpace",
            Self::RightPeriod => "RightPeriod",
            Self::InvalidUtf8 => "InvalidUtf8",
            Self::Dot => "Dot",
        }
    }
}

impl fmt::Display for EncodingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncodingRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|rule| rule.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidEncoding(s.to_string())))
    }
}

/// A set of active [`EncodingRule`]s.
///
/// The [base rules](EncodingRule::BASE) are always part of the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Encoding {
    rules: BTreeSet<EncodingRule>,
}

impl Encoding {
    pub fn new(rules: impl IntoIterator<Item = EncodingRule>) -> Self {
        let mut rules: BTreeSet<EncodingRule> = rules.into_iter().collect();
        rules.extend(EncodingRule::BASE);
        Self { rules }
    }

    /// Only the base rules.
    pub fn base() -> Self {
        Self::new([])
    }

    pub fn contains(&self, rule: EncodingRule) -> bool {
        self.rules.contains(&rule)
    }

    pub fn rules(&self) -> impl Iterator<Item = EncodingRule> + '_ {
        self.rules.iter().copied()
    }
}

impl Default for Encoding {
    fn default() -> Self {
        // The default string only names known rules.
        DEFAULT_ENCODING.parse().unwrap_or_else(|_| Self::base())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    /// Parses a comma-separated ruleset. `None` and the empty string both
    /// select the base rules only; `Base` is accepted and ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rules = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("none") || part.eq_ignore_ascii_case("base") {
                continue;
            }
            rules.push(part.parse()?);
        }
        Ok(Self::new(rules))
    }
}

impl TryFrom<String> for Encoding {
    type Error = ErrorKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map_err(|err: Error| (*err).clone())
    }
}

impl From<Encoding> for String {
    fn from(value: Encoding) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.rules.iter().map(EncodingRule::name).collect();
        f.write_str(&names.join(","))
    }
}
