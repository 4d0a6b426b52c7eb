use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left alone when quoting a boundary token, matching the
/// unreserved set plus the `+` that spaces are translated into.
const BOUNDARY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'+')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Turns a user-supplied boundary into a valid wire token.
///
/// Spaces become `+` and any remaining reserved characters are
/// percent-encoded, so `i am spaced` yields `i+am+spaced`.
pub(crate) fn boundary_token(raw: &str) -> String {
    utf8_percent_encode(&raw.replace(' ', "+"), BOUNDARY_SET).to_string()
}

/// Encodes a part name for use inside a quoted header parameter.
///
/// Non-ASCII names become an RFC 2047 encoded word
/// (`=?utf-8?B?...?=`), otherwise embedded quotes are backslash-escaped
/// so the header line stays parseable.
pub(crate) fn header_name(name: &str) -> String {
    if name.is_ascii() {
        name.replace('"', "\\\"")
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(name.as_bytes()))
    }
}

/// Encodes a filename for the `filename` disposition parameter.
///
/// Embedded quotes are backslash-escaped and non-ASCII characters are
/// replaced with numeric character references.
pub(crate) fn file_name(filename: &str) -> String {
    let mut out = String::with_capacity(filename.len());

    for c in filename.chars() {
        if c == '"' {
            out.push_str("\\\"");
        } else if c.is_ascii() {
            out.push(c);
        } else {
            let _ = write!(out, "&#{};", c as u32);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_boundary_spaces() {
        assert_eq!(boundary_token("i am spaced"), "i+am+spaced");
    }

    #[test]
    fn quotes_boundary_reserved_characters() {
        assert_eq!(boundary_token("a/b?c"), "a%2Fb%3Fc");
        assert_eq!(boundary_token("AaB03x"), "AaB03x");
    }

    #[test]
    fn passes_ascii_names_through() {
        assert_eq!(header_name("array[]"), "array[]");
    }

    #[test]
    fn escapes_quotes_in_names() {
        assert_eq!(header_name("he\"llo"), "he\\\"llo");
    }

    #[test]
    fn encodes_non_ascii_names_as_encoded_words() {
        assert_eq!(header_name("héllo"), "=?utf-8?B?aMOpbGxv?=");
    }

    #[test]
    fn escapes_filenames() {
        assert_eq!(file_name("he\"llo.txt"), "he\\\"llo.txt");
        assert_eq!(file_name("résumé.pdf"), "r&#233;sum&#233;.pdf");
    }
}
