//! String helpers shared by the checks4shell crates.
//!
//! Check run fields have hard byte limits on the GitHub side, so anything we
//! send is cut from the front while keeping the most recent output. Cuts are
//! always made on grapheme cluster boundaries so the rendered text never shows
//! half of a character.

use std::borrow::Cow;
use std::iter;

use unicode_segmentation::UnicodeSegmentation;

/// Prefix written in front of text that had its head removed.
pub const TRUNCATION_MARKER: &str = "[truncated]...\n\n";

/// Bounds `input` to `limit` bytes by dropping its head.
///
/// Text strictly shorter than `limit` is returned untouched. Otherwise the
/// result is [`TRUNCATION_MARKER`] followed by the longest suffix of `input`
/// that starts on a grapheme cluster boundary and still fits in the budget.
/// The returned string is never longer than `limit` bytes.
pub fn truncate_head(input: &str, limit: usize) -> Cow<'_, str> {
    if input.len() < limit {
        return Cow::Borrowed(input);
    }

    // The marker is ASCII so any prefix of it is valid UTF-8.
    let Some(budget) = limit.checked_sub(TRUNCATION_MARKER.len()) else {
        return Cow::Borrowed(&TRUNCATION_MARKER[..limit]);
    };

    let tail = take_last_graphemes(input, budget);
    let mut truncated = String::with_capacity(TRUNCATION_MARKER.len() + tail.len());
    truncated.push_str(TRUNCATION_MARKER);
    truncated.push_str(tail);
    Cow::Owned(truncated)
}

/// Returns the longest suffix of `input` that is at most `max_bytes` long and
/// begins on a grapheme cluster boundary of `input`.
///
/// Boundaries are computed over the whole string rather than from the cut
/// point, since sequences like regional indicator pairs depend on everything
/// before them.
pub fn take_last_graphemes(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }

    let earliest_start = input.len() - max_bytes;
    let start = input
        .grapheme_indices(true)
        .map(|(idx, _)| idx)
        .chain(iter::once(input.len()))
        .find(|idx| *idx >= earliest_start)
        .unwrap_or(input.len());
    &input[start..]
}
