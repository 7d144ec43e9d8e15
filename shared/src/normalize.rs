//! Canonical plain-text form of markup-bearing fragments.
//!
//! Matching compares normalized strings by equality and containment, so this
//! must stay in lockstep with the document processor: tags are dropped with
//! the same pattern and whitespace is collapsed the same way. Malformed markup
//! never fails; whatever cannot be interpreted is kept as literal text.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));
static TEXTAREA: Lazy<Selector> =
    Lazy::new(|| Selector::parse("textarea").expect("valid textarea selector"));

/// Strip tags, decode entities, collapse whitespace, trim and drop
/// zero-width characters.
///
/// The pass is repeated until the text stops changing, so escaped markup
/// (`&lt;b&gt;`) ends up in the same form as the raw markup it encodes and
/// `normalize(normalize(x)) == normalize(x)` holds for every input.
///
/// The repetition also drops anything that decodes to tag-like text: both
/// `x &lt;y&gt; z` and `x <y> z` become `x z`, so a finding that quotes
/// markup literally can match a leaf that contains the real markup exactly.
pub fn normalize(markup: &str) -> String {
    let mut current = single_pass(markup);
    loop {
        let next = single_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn single_pass(markup: &str) -> String {
    let stripped = TAG_RE.replace_all(markup, "");
    let decoded = decode_entities(&stripped);
    let mut out = String::with_capacity(decoded.len());
    let mut pending_space = false;
    for c in decoded.chars() {
        if is_invisible(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Zero-width and formatting-only characters.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

/// Decode character references the way a browser decodes the content of a
/// `<textarea>`: the full HTML5 named set, legacy references without a
/// semicolon (`&amp`, `&nbsp`), and numeric references with the usual
/// replacements. Text that is not a reference is copied through.
///
/// Callers strip tags first; the text is parsed as raw character data so no
/// element can be opened from it.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let fragment = Html::parse_fragment(&format!("<textarea>{s}</textarea>"));
    match fragment.select(&TEXTAREA).next() {
        Some(el) => el.text().collect(),
        None => s.to_string(),
    }
}

/// Escape text for embedding in markup.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
