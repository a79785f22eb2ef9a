//! Key extraction: turns a raw input line into a 64-bit fingerprint.
//! Key: XXH3-64 of the whole line, or of the selected columns concatenated
//! in the order they were requested. Collisions count as duplicates.

use std::ops::Range;
use std::str::FromStr;

use memchr::memmem;
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

use crate::error::ConfigError;

/// Dedup key of a line.
pub type Fingerprint = u64;

/// Which part of a line identifies it for caching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeySpec {
    /// Hash the raw line.
    #[default]
    WholeLine,
    /// 1-based column indices, kept in the order given.
    Columns(Vec<i64>),
}

impl FromStr for KeySpec {
    type Err = ConfigError;

    /// Parse a comma-separated COLSPEC such as `1` or `3,1`.
    /// Non-positive indices are kept; they make every line fall back to
    /// whole-line hashing.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let columns = spec
            .split(',')
            .map(|token| {
                token.trim().parse::<i64>().map_err(|_| ConfigError::InvalidColumn {
                    spec: spec.to_string(),
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeySpec::Columns(columns))
    }
}

/// Hash raw bytes with the fixed fingerprint function.
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> Fingerprint {
    xxh3_64(bytes)
}

/// Stateful extractor. Reuses its field buffer across lines.
pub struct KeyExtractor {
    spec: KeySpec,
    finder: memmem::Finder<'static>,
    separator_len: usize,
    fields: Vec<Range<usize>>,
}

impl KeyExtractor {
    /// `separator` must be non-empty; [`crate::config::Options::cache_config`] checks this.
    pub fn new(spec: KeySpec, separator: &[u8]) -> Self {
        Self {
            spec,
            finder: memmem::Finder::new(separator).into_owned(),
            separator_len: separator.len(),
            fields: Vec::new(),
        }
    }

    pub fn spec(&self) -> &KeySpec {
        &self.spec
    }

    /// Fingerprint of `line` (without its terminator).
    pub fn fingerprint(&mut self, line: &[u8]) -> Fingerprint {
        let columns = match &self.spec {
            KeySpec::WholeLine => return hash_bytes(line),
            KeySpec::Columns(columns) => columns,
        };

        self.fields.clear();
        let mut start = 0;
        for pos in self.finder.find_iter(line) {
            self.fields.push(start..pos);
            start = pos + self.separator_len;
        }
        self.fields.push(start..line.len());

        let field_count = self.fields.len() as i64;
        if columns.iter().any(|&c| c < 1 || c > field_count) {
            return hash_bytes(line);
        }

        // Streaming update hashes the same bytes as the concatenated string.
        let mut hasher = Xxh3::new();
        for &c in columns {
            hasher.update(&line[self.fields[(c - 1) as usize].clone()]);
        }
        hasher.digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(spec: &str) -> KeyExtractor {
        KeyExtractor::new(spec.parse().unwrap(), b"\t")
    }

    #[test]
    fn parses_colspec_in_given_order() {
        assert_eq!("3,1".parse::<KeySpec>().unwrap(), KeySpec::Columns(vec![3, 1]));
        assert_eq!("-1".parse::<KeySpec>().unwrap(), KeySpec::Columns(vec![-1]));
        assert_eq!(" 2 ".parse::<KeySpec>().unwrap(), KeySpec::Columns(vec![2]));
    }

    #[test]
    fn rejects_non_integer_columns() {
        for bad in ["", "a", "1,,2", "1.5", "1,x"] {
            assert!(
                matches!(bad.parse::<KeySpec>(), Err(ConfigError::InvalidColumn { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn whole_line_is_plain_hash() {
        let mut ex = KeyExtractor::new(KeySpec::WholeLine, b"\t");
        assert_eq!(ex.fingerprint(b"a\tX"), hash_bytes(b"a\tX"));
        assert_ne!(ex.fingerprint(b"a\tX"), ex.fingerprint(b"a\tZ"));
    }

    #[test]
    fn selected_column_ignores_other_columns() {
        let mut ex = columns("1");
        assert_eq!(ex.fingerprint(b"a\tX"), ex.fingerprint(b"a\tZ"));
        assert_ne!(ex.fingerprint(b"a\tX"), ex.fingerprint(b"b\tX"));
        assert_eq!(ex.fingerprint(b"a\tX"), hash_bytes(b"a"));
    }

    #[test]
    fn columns_are_concatenated_in_request_order() {
        let mut ex = columns("2,1");
        assert_eq!(ex.fingerprint(b"a\tb\tc"), hash_bytes(b"ba"));
        let mut ex = columns("1,2");
        assert_eq!(ex.fingerprint(b"a\tb\tc"), hash_bytes(b"ab"));
    }

    #[test]
    fn out_of_range_column_falls_back_to_whole_line() {
        let mut ex = columns("5");
        assert_eq!(ex.fingerprint(b"a\tX"), hash_bytes(b"a\tX"));
        assert_eq!(ex.fingerprint(b"a\tX"), ex.fingerprint(b"a\tX"));
        assert_ne!(ex.fingerprint(b"a\tX"), ex.fingerprint(b"a\tY"));

        let mut ex = columns("0");
        assert_eq!(ex.fingerprint(b"a\tX"), hash_bytes(b"a\tX"));
        let mut ex = columns("1,-1");
        assert_eq!(ex.fingerprint(b"a\tX"), hash_bytes(b"a\tX"));
    }

    #[test]
    fn multi_byte_separator_splits_non_overlapping() {
        let mut ex = KeyExtractor::new("2".parse().unwrap(), b"::");
        assert_eq!(ex.fingerprint(b"a::b::c"), hash_bytes(b"b"));
        // ":::" yields fields "a" and ":b"
        assert_eq!(ex.fingerprint(b"a:::b"), hash_bytes(b":b"));
    }

    #[test]
    fn empty_fields_are_kept() {
        let mut ex = columns("3");
        assert_eq!(ex.fingerprint(b"a\t\t"), hash_bytes(b""));
        assert_eq!(ex.fingerprint(b"\t\tz"), hash_bytes(b"z"));
    }
}
