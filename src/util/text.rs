use std::borrow::Cow;

/// Ellipsis string used for truncation
const ELLIPSIS: &str = "...";
/// Character count of the ellipsis
const ELLIPSIS_LEN: usize = 3;

/// Entities decoded by [`decode_entities`], matched in a single pass.
const ENTITIES: &[(&str, char)] = &[
    ("&nbsp;", ' '),
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&#039;", '\''),
    ("&#39;", '\''),
    ("&apos;", '\''),
];

/// Converts a feed-provided HTML fragment into plain text.
///
/// Strips every `<...>` tag, decodes the common HTML entities, drops control
/// characters and trims surrounding whitespace. Never fails: malformed markup
/// (an unterminated `<`) is kept verbatim.
///
/// # Examples
///
/// ```
/// use feedrelay::util::clean_text;
///
/// assert_eq!(clean_text("<b>Title</b>&amp;More"), "Title&More");
/// assert_eq!(clean_text("  a&nbsp;b  "), "a b");
/// ```
pub fn clean_text(raw: &str) -> String {
    let stripped = strip_tags(raw);
    let decoded = decode_entities(&stripped);
    let visible = strip_control_chars(&decoded);
    visible.trim().to_string()
}

/// Removes `<...>` markup. An opening `<` with no closing `>` is left as text.
pub fn strip_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Decodes the entities listed in [`ENTITIES`]. Unknown entities pass through.
///
/// Decoding is single-pass, so `&amp;lt;` becomes the literal text `&lt;`.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    'outer: while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        for (entity, ch) in ENTITIES {
            if tail.starts_with(entity) {
                out.push(*ch);
                rest = &tail[entity.len()..];
                continue 'outer;
            }
        }
        out.push('&');
        rest = &tail[1..];
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Drops ASCII control characters except tab, newline and carriage return.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r');

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !is_control(*c)).collect())
}

/// Truncates to at most `max_chars` characters, ending with "..." when cut.
///
/// Counts Unicode scalar values, not bytes, so multi-byte text is never split
/// mid-character. Returns `Cow::Borrowed` when the string already fits.
///
/// # Examples
///
/// ```
/// use feedrelay::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 8), "Hello...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    if max_chars <= ELLIPSIS_LEN {
        return Cow::Owned(s.chars().take(max_chars).collect());
    }

    let keep = max_chars - ELLIPSIS_LEN;
    let cut = s
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
}
