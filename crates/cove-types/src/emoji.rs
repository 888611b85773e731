//! Reaction input validation: a reaction must be exactly one emoji grapheme.

use std::sync::LazyLock;

use regex::Regex;

// One emoji grapheme: either a two-character regional-indicator flag, or a
// single pictographic base (default emoji presentation, or text presentation
// forced emoji with U+FE0F) with an optional skin-tone modifier, optionally
// extended by ZWJ-joined continuations of the same shape.
static EMOJI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^(?:
            [\x{1F1E6}-\x{1F1FF}]{2}
            |
            (?:\p{Emoji_Presentation}|\p{Emoji}\x{FE0F})\p{Emoji_Modifier}?
            (?:\x{200D}(?:\p{Emoji_Presentation}|\p{Emoji}\x{FE0F})\p{Emoji_Modifier}?)*
        )$",
    )
    .expect("emoji regex must compile")
});

/// Whether `input` is exactly one emoji grapheme. Multi-emoji strings, plain
/// text and empty input are rejected.
pub fn is_single_emoji(input: &str) -> bool {
    !input.is_empty() && EMOJI_RE.is_match(input)
}
