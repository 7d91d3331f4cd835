//! Line-oriented `key=value` properties format.
//!
//! Compatible with the Java `.properties` text format:
//!
//! ```text
//! # comment            ! also a comment
//! serverUri = p4java://myhost:1666
//! userName:alice
//! clientName my-workspace
//! password=multi \
//!          line
//! ```
//!
//! Keys end at the first unescaped `=`, `:` or whitespace. A line ending in an
//! odd number of backslashes continues on the next one. `\t \n \r \f \uXXXX`
//! are unescaped; any other escaped character stands for itself.

use std::collections::HashMap;

use thiserror::Error;

/// A malformed properties document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertiesError {
    #[error("malformed \\uXXXX escape on line {line}")]
    MalformedUnicodeEscape { line: usize },
}

/// Flat mapping of property keys to values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Like [`get`](Self::get), but an empty value counts as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Parse a properties document.
pub fn parse(input: &str) -> Result<Properties, PropertiesError> {
    let mut props = Properties::new();
    for (line_no, line) in logical_lines(input) {
        let (key, value) = split_entry(&line);
        let key = unescape(key, line_no)?;
        let value = unescape(value, line_no)?;
        props.insert(key, value);
    }
    Ok(props)
}

/// Decode raw file bytes: UTF-8 when valid (a leading byte-order mark is
/// dropped), otherwise ISO-8859-1.
pub fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => match text.strip_prefix('\u{FEFF}') {
            Some(rest) => rest.to_string(),
            None => text,
        },
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{000C}')
}

/// Join continuation lines and drop comments and blank lines. Each logical
/// line is returned with the 1-based number of the line it started on.
fn logical_lines(input: &str) -> Vec<(usize, Vec<char>)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, Vec<char>)> = None;

    let normalized = input.replace("\r\n", "\n");
    for (idx, natural) in normalized.split(['\n', '\r']).enumerate() {
        let trimmed = natural.trim_start_matches(is_blank);

        let (start, mut buf) = match pending.take() {
            Some(open) => open,
            None => {
                if trimmed.is_empty() || trimmed.starts_with(['#', '!']) {
                    continue;
                }
                (idx + 1, Vec::new())
            }
        };
        buf.extend(trimmed.chars());

        let trailing = buf.iter().rev().take_while(|&&c| c == '\\').count();
        if trailing % 2 == 1 {
            buf.pop();
            pending = Some((start, buf));
        } else {
            out.push((start, buf));
        }
    }

    if let Some(open) = pending {
        out.push(open);
    }
    out
}

/// Split a logical line into raw (still escaped) key and value.
fn split_entry(line: &[char]) -> (&[char], &[char]) {
    let mut key_end = line.len();
    let mut value_start = line.len();
    let mut has_separator = false;
    let mut escaped = false;

    for (i, &c) in line.iter().enumerate() {
        if !escaped && (c == '=' || c == ':') {
            key_end = i;
            value_start = i + 1;
            has_separator = true;
            break;
        }
        if !escaped && is_blank(c) {
            key_end = i;
            value_start = i + 1;
            break;
        }
        escaped = c == '\\' && !escaped;
    }

    while value_start < line.len() {
        let c = line[value_start];
        if is_blank(c) {
            value_start += 1;
        } else if !has_separator && (c == '=' || c == ':') {
            has_separator = true;
            value_start += 1;
        } else {
            break;
        }
    }

    (&line[..key_end], &line[value_start..])
}

fn unescape(raw: &[char], line: usize) -> Result<String, PropertiesError> {
    let mut out = String::with_capacity(raw.len());
    // Consecutive \u escapes are gathered so surrogate pairs decode together.
    let mut units: Vec<u16> = Vec::new();
    let mut chars = raw.iter().copied();

    while let Some(c) = chars.next() {
        if c != '\\' {
            flush_units(&mut units, &mut out);
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            break;
        };
        if next == 'u' {
            let mut unit: u16 = 0;
            for _ in 0..4 {
                let digit = chars
                    .next()
                    .and_then(|h| h.to_digit(16))
                    .ok_or(PropertiesError::MalformedUnicodeEscape { line })?;
                unit = (unit << 4) | digit as u16;
            }
            units.push(unit);
            continue;
        }
        flush_units(&mut units, &mut out);
        out.push(match next {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'f' => '\u{000C}',
            other => other,
        });
    }
    flush_units(&mut units, &mut out);
    Ok(out)
}

fn flush_units(units: &mut Vec<u16>, out: &mut String) {
    if units.is_empty() {
        return;
    }
    out.extend(
        char::decode_utf16(units.drain(..)).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(input: &str) -> Properties {
        parse(input).expect("document should parse")
    }

    #[test]
    fn plain_key_value_lines() {
        let p = parsed(
            "serverUri=p4java://myhost:1666\nuserName=alice\nclientName=my-workspace\npassword=secret\n",
        );
        assert_eq!(p.len(), 4);
        assert_eq!(p.get("serverUri"), Some("p4java://myhost:1666"));
        assert_eq!(p.get("userName"), Some("alice"));
        assert_eq!(p.get("clientName"), Some("my-workspace"));
        assert_eq!(p.get("password"), Some("secret"));
    }

    #[test]
    fn separators_and_surrounding_whitespace() {
        let p = parsed("  a = 1\nb:2\nc 3\nd\t:\t4\ne =  = 5");
        assert_eq!(p.get("a"), Some("1"));
        assert_eq!(p.get("b"), Some("2"));
        assert_eq!(p.get("c"), Some("3"));
        assert_eq!(p.get("d"), Some("4"));
        assert_eq!(p.get("e"), Some("= 5"));
    }

    #[test]
    fn trailing_whitespace_is_kept_in_value() {
        let p = parsed("key=value  ");
        assert_eq!(p.get("key"), Some("value  "));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let p = parsed("# comment\n   ! bang comment\n\n   \nkey=value\n");
        assert_eq!(p.len(), 1);
        assert_eq!(p.get("key"), Some("value"));
    }

    #[test]
    fn key_without_value_is_empty() {
        let p = parsed("userName\npassword=");
        assert_eq!(p.get("userName"), Some(""));
        assert_eq!(p.get("password"), Some(""));
        assert_eq!(p.get_non_empty("password"), None);
    }

    #[test]
    fn continuation_lines_join() {
        let p = parsed("clientName=my-\\\n      workspace\nnext=1");
        assert_eq!(p.get("clientName"), Some("my-workspace"));
        assert_eq!(p.get("next"), Some("1"));
    }

    #[test]
    fn continued_line_starting_with_hash_is_not_a_comment() {
        let p = parsed("key=a\\\n#b");
        assert_eq!(p.get("key"), Some("a#b"));
    }

    #[test]
    fn even_backslashes_do_not_continue() {
        let p = parsed("path=c:\\\\\nnext=1");
        assert_eq!(p.get("path"), Some("c:\\"));
        assert_eq!(p.get("next"), Some("1"));
    }

    #[test]
    fn continuation_at_end_of_input() {
        let p = parsed("key=value\\");
        assert_eq!(p.get("key"), Some("value"));
    }

    #[test]
    fn escapes_in_keys_and_values() {
        let p = parsed("my\\ key\\=x=tab\\there\\nnl \\q");
        assert_eq!(p.get("my key=x"), Some("tab\there\nnl q"));
    }

    #[test]
    fn unicode_escapes_decode() {
        let p = parsed("name=caf\\u00e9\nemoji=\\ud83d\\ude00");
        assert_eq!(p.get("name"), Some("café"));
        assert_eq!(p.get("emoji"), Some("😀"));
    }

    #[test]
    fn malformed_unicode_escape_reports_line() {
        let err = parse("ok=1\nbad=\\u12g4").unwrap_err();
        assert_eq!(err, PropertiesError::MalformedUnicodeEscape { line: 2 });
    }

    #[test]
    fn crlf_and_cr_line_endings() {
        let p = parsed("a=1\r\nb=2\rc=3");
        assert_eq!(p.get("a"), Some("1"));
        assert_eq!(p.get("b"), Some("2"));
        assert_eq!(p.get("c"), Some("3"));
    }

    #[test]
    fn later_duplicate_wins() {
        let p = parsed("userName=alice\nuserName=bob");
        assert_eq!(p.get("userName"), Some("bob"));
    }

    #[test]
    fn iter_yields_every_entry() {
        let p = parsed("b=2\na=1");
        let mut entries: Vec<_> = p.iter().collect();
        entries.sort();
        assert_eq!(entries, [("a", "1"), ("b", "2")]);
    }

    #[test]
    fn decode_strips_utf8_bom() {
        let text = decode(b"\xef\xbb\xbfserverUri=p4java://myhost:1666\n".to_vec());
        let p = parsed(&text);
        assert_eq!(p.get("serverUri"), Some("p4java://myhost:1666"));
    }

    #[test]
    fn decode_falls_back_to_latin1() {
        assert_eq!(decode(b"caf\xc3\xa9".to_vec()), "café");
        assert_eq!(decode(b"caf\xe9".to_vec()), "café");
    }
}
