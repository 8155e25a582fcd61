//! Escaping and pre-escaped markup.
//!
//! [`Markup`] marks a string as safe HTML. Anything else that ends up in
//! output goes through [`escape`] first.

use std::fmt;

use serde::Serialize;

/// A string of HTML that is already safe to emit verbatim.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Markup(String);

impl Markup {
    /// Wrap a string that the caller vouches for.
    pub fn safe(html: impl Into<String>) -> Self {
        Self(html.into())
    }

    /// Escape plain text into markup.
    pub fn text(text: &str) -> Self {
        Self(escape(text))
    }

    pub fn new() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append safe markup.
    pub fn push(&mut self, other: &Markup) {
        self.0.push_str(&other.0);
    }

    /// Append raw HTML the caller vouches for.
    pub fn push_safe(&mut self, html: &str) {
        self.0.push_str(html);
    }

    /// Append plain text, escaping it.
    pub fn push_text(&mut self, text: &str) {
        self.0.push_str(&escape(text));
    }

    /// Join fragments with a separator (which is trusted).
    pub fn join<'a>(parts: impl IntoIterator<Item = &'a Markup>, sep: &str) -> Markup {
        let mut out = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.push_str(sep);
            }
            out.push_str(&part.0);
        }
        Markup(out)
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Markup({:?})", self.0)
    }
}

impl From<Markup> for String {
    fn from(m: Markup) -> Self {
        m.0
    }
}

/// Escape `& < > " '` for use in text or attribute values.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Decode character references in an attribute value.
///
/// Handles the five named entities [`escape`] produces plus `&nbsp;` and
/// numeric references (`&#39;`, `&#x27;`). Unknown or malformed references
/// are left as-is.
pub fn unescape(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';').filter(|&i| i <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => decode_numeric(entity),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_numeric(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

/// Render `key="value"` pairs, escaping both sides.
pub fn format_attrs<'a>(attrs: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
    attrs
        .into_iter()
        .map(|(k, v)| format!("{}=\"{}\"", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"Tom\" & 'Jerry'</b>"), "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a &amp; b"), "a & b");
        assert_eq!(unescape("&lt;&#39;&#x27;&gt;"), "<''>");
        assert_eq!(unescape("fish & chips"), "fish & chips");
        assert_eq!(unescape("&bogus; &#xZZ;"), "&bogus; &#xZZ;");
    }

    #[test]
    fn test_markup_join() {
        let parts = [Markup::safe("<b>a</b>"), Markup::text("<c>")];
        assert_eq!(Markup::join(&parts, "\n").as_str(), "<b>a</b>\n&lt;c&gt;");
    }
}
