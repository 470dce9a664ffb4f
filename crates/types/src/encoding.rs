//! Percent-encoding for free-text wire fields
//!
//! Domain names, sensor names and sensor messages are arbitrary user text.
//! Every byte outside the RFC 3986 unreserved set is escaped so the payload
//! stays well-formed no matter which delimiters the text contains.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::str::Utf8Error;

/// Bytes left untouched: `A-Z a-z 0-9 - . _ ~`
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a free-text field
pub fn percent_encode(text: &str) -> String {
    utf8_percent_encode(text, UNRESERVED).to_string()
}

/// Reverse [`percent_encode`]
pub fn percent_decode(text: &str) -> Result<String, Utf8Error> {
    percent_decode_str(text).decode_utf8().map(|s| s.into_owned())
}
