//! Path codec.
//!
//! Maps canonical names and paths to the form the remote stores and queries,
//! and back again. Characters named by the configured [`Encoding`] are
//! swapped for look-alike Unicode codepoints (fullwidth punctuation and
//! control pictures). A literal occurrence of a substitute is prefixed with
//! [`QUOTE`] so decoding can tell the two apart, which makes
//! `decode(encode(s)) == s` hold for every string.
//!
//! The remote's search expressions treat `&` as a boolean operator, so after
//! the ruleset has been applied every `&` is replaced by
//! [`AMPERSAND_PLACEHOLDER`]. Decoding undoes that pass first (it is the
//! outermost layer of the encoding), skipping quoted pairs so a literal
//! placeholder in a name survives.

use crate::path::RemotePath;
use cldfs_config::{Encoding, EncodingRule};

/// Escape prefix for characters that would otherwise decode to something else.
pub const QUOTE: char = '\u{201B}';
/// Stand-in for `&` in everything sent to the remote.
pub const AMPERSAND_PLACEHOLDER: char = '\u{FF06}';

const FULLWIDTH_OFFSET: u32 = 0xFEE0;
const CONTROL_PICTURES: u32 = 0x2400;
const SYMBOL_FOR_DELETE: char = '\u{2421}';
const SYMBOL_FOR_SPACE: char = '\u{2420}';
const FULLWIDTH_FULL_STOP: char = '\u{FF0E}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    encoding: Encoding,
}

impl Codec {
    pub fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    /// Canonical name to remote name.
    pub fn encode_name(&self, name: &str) -> String {
        self.escape(name).replace('&', &AMPERSAND_PLACEHOLDER.to_string())
    }

    /// Remote name to canonical name.
    pub fn decode_name(&self, name: &str) -> String {
        self.unescape(&self.restore_ampersands(name))
    }

    /// Canonical path to remote path. The root encodes to the empty string and
    /// no encoded path ever ends with a separator.
    pub fn encode_path(&self, path: &RemotePath) -> String {
        path.segments().iter().map(|segment| self.encode_name(segment)).collect::<Vec<_>>().join("/")
    }

    /// Remote path to canonical path. Empty segments are ignored.
    pub fn decode_path(&self, path: &str) -> RemotePath {
        RemotePath::from_segments(path.split('/').filter(|s| !s.is_empty()).map(|s| self.decode_name(s)))
    }

    fn escape(&self, name: &str) -> String {
        if self.encoding.contains(EncodingRule::Dot) && (name == "." || name == "..") {
            return name.chars().map(|_| FULLWIDTH_FULL_STOP).collect();
        }
        let last = name.chars().count().saturating_sub(1);
        let mut out = String::with_capacity(name.len());
        for (i, c) in name.chars().enumerate() {
            if c == QUOTE || self.is_reserved(c) {
                out.push(QUOTE);
                out.push(c);
            } else {
                out.push(self.substitute(c, i == 0, i == last).unwrap_or(c));
            }
        }
        out
    }

    fn unescape(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len());
        let mut chars = name.chars().peekable();
        while let Some(c) = chars.next() {
            if c == QUOTE {
                match chars.peek() {
                    Some(&next) if next == QUOTE || self.is_reserved(next) => {
                        out.push(next);
                        chars.next();
                    },
                    // A lone quote can't come out of `escape`; keep it verbatim.
                    _ => out.push(QUOTE),
                }
                continue;
            }
            out.push(self.original(c).unwrap_or(c));
        }
        out
    }

    /// Inverse of the ampersand pass: unquoted placeholders become `&`.
    fn restore_ampersands(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len());
        let mut chars = name.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                QUOTE => {
                    out.push(QUOTE);
                    if let Some(&next) = chars.peek()
                        && (next == QUOTE || self.is_reserved(next))
                    {
                        out.push(next);
                        chars.next();
                    }
                },
                AMPERSAND_PLACEHOLDER => out.push('&'),
                other => out.push(other),
            }
        }
        out
    }

    /// The substitute for `c`, if an active rule covers it at this position.
    fn substitute(&self, c: char, first: bool, last: bool) -> Option<char> {
        let rules = &self.encoding;
        match c {
            '\0' if rules.contains(EncodingRule::Zero) => char::from_u32(CONTROL_PICTURES),
            '\u{01}'..='\u{1F}' if rules.contains(EncodingRule::Ctl) => char::from_u32(CONTROL_PICTURES + c as u32),
            '\u{7F}' if rules.contains(EncodingRule::Del) => Some(SYMBOL_FOR_DELETE),
            ' ' if (first && rules.contains(EncodingRule::LeftSpace))
                || (last && rules.contains(EncodingRule::RightSpace)) =>
            {
                Some(SYMBOL_FOR_SPACE)
            },
            '.' if last && rules.contains(EncodingRule::RightPeriod) => Some(FULLWIDTH_FULL_STOP),
            _ => match punctuation_rule(c) {
                Some(rule) if rules.contains(rule) => char::from_u32(c as u32 + FULLWIDTH_OFFSET),
                _ => None,
            },
        }
    }

    /// The character `c` stands in for, if `c` is a substitute under the
    /// active rules.
    fn original(&self, c: char) -> Option<char> {
        let rules = &self.encoding;
        let code = c as u32;
        match c {
            '\u{2400}' if rules.contains(EncodingRule::Zero) => Some('\0'),
            '\u{2401}'..='\u{241F}' if rules.contains(EncodingRule::Ctl) => char::from_u32(code - CONTROL_PICTURES),
            SYMBOL_FOR_DELETE if rules.contains(EncodingRule::Del) => Some('\u{7F}'),
            SYMBOL_FOR_SPACE
                if rules.contains(EncodingRule::LeftSpace) || rules.contains(EncodingRule::RightSpace) =>
            {
                Some(' ')
            },
            FULLWIDTH_FULL_STOP if rules.contains(EncodingRule::Dot) || rules.contains(EncodingRule::RightPeriod) => {
                Some('.')
            },
            '\u{FF01}'..='\u{FF5E}' => {
                let ascii = char::from_u32(code - FULLWIDTH_OFFSET)?;
                punctuation_rule(ascii).filter(|rule| rules.contains(*rule)).map(|_| ascii)
            },
            _ => None,
        }
    }

    /// Characters that must be quoted when they appear literally.
    fn is_reserved(&self, c: char) -> bool {
        c == AMPERSAND_PLACEHOLDER || self.original(c).is_some()
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(Encoding::default())
    }
}

fn punctuation_rule(c: char) -> Option<EncodingRule> {
    Some(match c {
        '/' => EncodingRule::Slash,
        '<' | '>' => EncodingRule::LtGt,
        '"' => EncodingRule::DoubleQuote,
        '\'' => EncodingRule::SingleQuote,
        '`' => EncodingRule::BackQuote,
        '$' => EncodingRule::Dollar,
        ':' => EncodingRule::Colon,
        '?' => EncodingRule::Question,
        '*' => EncodingRule::Asterisk,
        '|' => EncodingRule::Pipe,
        '#' => EncodingRule::Hash,
        '%' => EncodingRule::Percent,
        '\\' => EncodingRule::BackSlash,
        ';' => EncodingRule::Semicolon,
        '!' => EncodingRule::Exclamation,
        '[' | ']' => EncodingRule::SquareBracket,
        _ => return None,
    })
}
