//! Post-processing of raw OCR output.
//!
//! OCR engines return text laid out the way it was printed: lines wrapped at
//! the page margin, words hyphenated across line ends and irregular runs of
//! whitespace. [`clean`] turns that into one line per paragraph, with
//! paragraphs separated by a single blank line.
//!
//! Paragraphs are split on blank lines (a newline, any whitespace, then a
//! newline). Each paragraph then has its line breaks joined, wrap hyphens
//! removed, whitespace runs collapsed and its ends trimmed.
//!
//! A paragraph that trims to nothing is kept as an empty string, so the
//! number of blank-line-delimited segments in the input is preserved. In
//! practice this only happens for leading or trailing blank runs, since a
//! blank run in the middle of the text is a single split point.

use std::sync::OnceLock;

use regex::Regex;

pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("paragraph break pattern is valid"))
}

/// Word characters are ASCII only: an accented letter next to the hyphen
/// leaves the break in place (`"réfé- rence"`).
fn wrap_hyphen() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9A-Za-z_]+)-\s+([0-9A-Za-z_]+)").expect("wrap hyphen pattern is valid")
    })
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Clean raw OCR text into paragraph-structured plain text.
pub fn clean(raw: &str) -> String {
    paragraph_break()
        .split(raw)
        .map(clean_paragraph)
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR)
}

fn clean_paragraph(paragraph: &str) -> String {
    let joined = paragraph.replace('\n', " ");
    let dehyphenated = dehyphenate(joined);
    whitespace_run()
        .replace_all(&dehyphenated, " ")
        .trim()
        .to_string()
}

/// Rejoin words split across a line end, e.g. `"infor- mation"`.
///
/// A single left-to-right pass consumes the word after each hyphen, so a
/// chain like `"x- y- z"` only loses its first hyphen. Passes repeat until no
/// match remains; every pass removes at least one hyphen.
fn dehyphenate(mut text: String) -> String {
    let re = wrap_hyphen();
    while re.is_match(&text) {
        text = re.replace_all(&text, "${1}${2}").into_owned();
    }
    text
}

/// Number of blank-line-delimited segments [`clean`] will produce for `raw`.
pub fn paragraph_count(raw: &str) -> usize {
    paragraph_break().split(raw).count()
}
