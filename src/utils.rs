//! Assertion helpers and small encoding utilities for checker bodies
//!
//! The assertion helpers are the vocabulary a checker uses to express
//! correctness expectations about the service: on mismatch they return the
//! broken-service signal, so `?` inside an action body turns a failed check
//! into a `MUMBLE` outcome.

use std::fmt::Debug;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{CheckerError, CheckerResult};

/// Fail with `Broken` if the two values differ. The optional message
/// replaces the generated "expected vs actual" default.
pub fn assert_equals<T: PartialEq + Debug>(
    expected: T,
    actual: T,
    message: Option<&str>,
) -> CheckerResult<()> {
    if expected == actual {
        return Ok(());
    }
    let msg = message
        .map(str::to_string)
        .unwrap_or_else(|| format!("{expected:?} is not equal to {actual:?}"));
    Err(CheckerError::Broken(msg))
}

/// Like [`assert_equals`], but normalizes both sides to bytes first. This is
/// the opt-in mode for comparing text against raw service output.
pub fn assert_equals_bytes(
    expected: impl AsRef<[u8]>,
    actual: impl AsRef<[u8]>,
    message: Option<&str>,
) -> CheckerResult<()> {
    let (expected, actual) = (expected.as_ref(), actual.as_ref());
    if expected == actual {
        return Ok(());
    }
    let msg = message.map(str::to_string).unwrap_or_else(|| {
        format!(
            "{} is not equal to {}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(actual)
        )
    });
    Err(CheckerError::Broken(msg))
}

/// Fail with `Broken` if `needle` does not occur in the text blob.
pub fn assert_in(needle: &str, haystack: &str, message: Option<&str>) -> CheckerResult<()> {
    if haystack.contains(needle) {
        return Ok(());
    }
    let msg = message
        .map(str::to_string)
        .unwrap_or_else(|| format!("{needle:?} is not in {haystack:?}"));
    Err(CheckerError::Broken(msg))
}

/// Fail with `Broken` if `needle` is not an element of the sequence.
pub fn assert_contains<T: PartialEq + Debug>(
    needle: &T,
    haystack: &[T],
    message: Option<&str>,
) -> CheckerResult<()> {
    if haystack.contains(needle) {
        return Ok(());
    }
    let msg = message
        .map(str::to_string)
        .unwrap_or_else(|| format!("{needle:?} is not in {haystack:?}"));
    Err(CheckerError::Broken(msg))
}

/// Strip everything that is not alphanumeric, `-`, `_` or `.` from a string
/// so it can be used as a filename. Falls back to url-safe base64 of the
/// original when too little survives.
pub fn ensure_valid_filename(s: &str) -> String {
    const MIN_LENGTH: usize = 3;
    let cleaned: String = s
        .trim()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if cleaned.len() < MIN_LENGTH {
        URL_SAFE_NO_PAD.encode(s.as_bytes())
    } else {
        cleaned
    }
}

/// Base64 representation of a value.
pub fn base64ify(data: impl AsRef<[u8]>) -> String {
    STANDARD.encode(data)
}

/// Decode a base64 string back to text.
pub fn debase64ify(s: &str) -> CheckerResult<String> {
    let bytes = STANDARD
        .decode(s)
        .map_err(|e| CheckerError::Serialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CheckerError::Serialization(e.to_string()))
}

/// Hex sha256 of a value, handy for deriving stable store keys from flags.
pub fn sha256ify(data: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(data.as_ref());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
