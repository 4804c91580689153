//! Caption text normalization.
//!
//! Emoji are removed in two passes: whole grapheme clusters that are known
//! emoji sequences (ZWJ families, flags, keycaps, skin-tone variants), then
//! any leftover pictographic code point by Unicode property, together with
//! the joiners and variation selectors attached to it. A joiner between
//! ordinary letters (Indic conjuncts, for one) is text and stays.
//! Whitespace runs collapse to a single space.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// A run of pictographic code points with any ZWJ / variation selectors touching it.
static PICTOGRAPHIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\x{200D}\x{FE0E}\x{FE0F}]*(?:[\p{Extended_Pictographic}\p{Emoji_Presentation}\p{Emoji_Modifier}\x{20E3}\x{E0020}-\x{E007F}][\x{200D}\x{FE0E}\x{FE0F}]*)+",
    )
    .expect("emoji pattern is valid")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Strip emoji and pictographic symbols, collapse whitespace, and trim.
///
/// Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(text: &str) -> String {
    let without_emoji = strip_emoji(text);
    WHITESPACE
        .replace_all(&without_emoji, " ")
        .trim()
        .to_string()
}

fn strip_emoji(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    for g in text.graphemes(true) {
        if emojis::get(g).is_none() {
            plain.push_str(g);
        }
    }
    PICTOGRAPHIC.replace_all(&plain, "").into_owned()
}
