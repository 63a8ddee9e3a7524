//! Byte-level JSON codec: key-scoped extraction and body assembly.
//!
//! Deliberately not a general-purpose parser. Extraction scans the
//! document bytes for the *first* occurrence of `"key"` followed by a
//! colon, at any nesting depth, and returns the value after it; that
//! first-match behaviour is part of the public contract. Callers that
//! need full document semantics use `serde_json` instead, as the HTTP
//! dialects do.

/// Find the start of the value for the first occurrence of `"key":`.
///
/// Returns the index of the first byte of the value, with any
/// whitespace after the colon already skipped.
fn find_value(json: &[u8], key: &str) -> Option<usize> {
    let key = key.as_bytes();
    let mut i = 0;
    while i < json.len() {
        if json[i] != b'"' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let end = start + key.len();
        if end >= json.len() || &json[start..end] != key || json[end] != b'"' {
            i += 1;
            continue;
        }
        // Found `"key"`; require a colon (whitespace allowed)
        let mut j = end + 1;
        while j < json.len() && json[j].is_ascii_whitespace() {
            j += 1;
        }
        if j < json.len() && json[j] == b':' {
            j += 1;
            while j < json.len() && json[j].is_ascii_whitespace() {
                j += 1;
            }
            return Some(j);
        }
        i = end;
    }
    None
}

/// Extract a string value. Returns the raw slice between the quotes,
/// escapes intact; pair with [`unescape`] when the decoded text is
/// needed. First match at any depth wins.
pub fn extract_string<'a>(json: &'a [u8], key: &str) -> Option<&'a str> {
    let start = find_value(json, key)?;
    if json.get(start) != Some(&b'"') {
        return None;
    }
    let mut i = start + 1;
    while i < json.len() {
        match json[i] {
            b'\\' => i += 2,
            b'"' => return std::str::from_utf8(&json[start + 1..i]).ok(),
            _ => i += 1,
        }
    }
    None
}

/// Extract an unsigned decimal integer value.
pub fn extract_uint(json: &[u8], key: &str) -> Option<u64> {
    let start = find_value(json, key)?;
    let mut i = start;
    let mut value: u64 = 0;
    let mut any = false;
    while i < json.len() && json[i].is_ascii_digit() {
        value = value
            .checked_mul(10)?
            .checked_add(u64::from(json[i] - b'0'))?;
        any = true;
        i += 1;
    }
    any.then_some(value)
}

/// Extract a boolean value.
pub fn extract_bool(json: &[u8], key: &str) -> Option<bool> {
    let start = find_value(json, key)?;
    if json[start..].starts_with(b"true") {
        Some(true)
    } else if json[start..].starts_with(b"false") {
        Some(false)
    } else {
        None
    }
}

/// Extract an object or array value as the balanced-brace substring,
/// string-aware (braces inside string literals are ignored).
pub fn extract_value<'a>(json: &'a [u8], key: &str) -> Option<&'a [u8]> {
    let start = find_value(json, key)?;
    let (open, close) = match json.get(start)? {
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = start;
    while i < json.len() {
        let b = json[i];
        if in_string {
            match b {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(&json[start..=i]);
            }
        }
        i += 1;
    }
    None
}

/// Append `s` to `dst` with JSON string escaping applied.
pub fn escape_into(dst: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => dst.push_str("\\\""),
            '\\' => dst.push_str("\\\\"),
            '\n' => dst.push_str("\\n"),
            '\r' => dst.push_str("\\r"),
            '\t' => dst.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                dst.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => dst.push(c),
        }
    }
}

/// Decode standard JSON escape sequences. Invalid sequences pass
/// through verbatim rather than failing; tool handlers prefer mangled
/// text over no text.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000c}'),
            Some('u') => {
                let hi = read_hex4(&mut chars);
                match hi {
                    Some(hi) if (0xd800..0xdc00).contains(&hi) => {
                        // Surrogate pair: expect \uXXXX low half next
                        let mut rest = chars.clone();
                        if rest.next() == Some('\\') && rest.next() == Some('u') {
                            if let Some(lo) = read_hex4(&mut rest) {
                                if (0xdc00..0xe000).contains(&lo) {
                                    let cp =
                                        0x10000 + ((hi - 0xd800) << 10) + (lo - 0xdc00);
                                    if let Some(c) = char::from_u32(cp) {
                                        out.push(c);
                                        chars = rest;
                                        continue;
                                    }
                                }
                            }
                        }
                        out.push(char::REPLACEMENT_CHARACTER);
                    }
                    Some(code) => {
                        out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                    }
                    None => out.push_str("\\u"),
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Option<u32> {
    let mut code = 0u32;
    for _ in 0..4 {
        code = code * 16 + chars.next()?.to_digit(16)?;
    }
    Some(code)
}

/// Streaming-safe JSON object/array writer.
///
/// Tracks whether a comma is due before the next element so bodies can
/// be assembled field by field. `raw_*` methods copy fragments through
/// without escaping.
#[derive(Debug, Default)]
pub struct Writer {
    buf: String,
    needs_comma: bool,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: String::with_capacity(cap),
            needs_comma: false,
        }
    }

    fn comma(&mut self) {
        if self.needs_comma {
            self.buf.push(',');
        }
        self.needs_comma = false;
    }

    pub fn begin_object(&mut self) -> &mut Self {
        self.comma();
        self.buf.push('{');
        self
    }

    pub fn end_object(&mut self) -> &mut Self {
        self.buf.push('}');
        self.needs_comma = true;
        self
    }

    pub fn begin_array(&mut self) -> &mut Self {
        self.comma();
        self.buf.push('[');
        self
    }

    pub fn end_array(&mut self) -> &mut Self {
        self.buf.push(']');
        self.needs_comma = true;
        self
    }

    pub fn key(&mut self, key: &str) -> &mut Self {
        self.comma();
        self.buf.push('"');
        escape_into(&mut self.buf, key);
        self.buf.push_str("\":");
        self
    }

    pub fn string_value(&mut self, value: &str) -> &mut Self {
        self.comma();
        self.buf.push('"');
        escape_into(&mut self.buf, value);
        self.buf.push('"');
        self.needs_comma = true;
        self
    }

    /// Copy a pre-encoded JSON fragment through without escaping.
    pub fn raw_value(&mut self, raw: &str) -> &mut Self {
        self.comma();
        self.buf.push_str(raw);
        self.needs_comma = true;
        self
    }

    pub fn uint_value(&mut self, value: u64) -> &mut Self {
        self.comma();
        self.buf.push_str(&value.to_string());
        self.needs_comma = true;
        self
    }

    pub fn bool_value(&mut self, value: bool) -> &mut Self {
        self.comma();
        self.buf.push_str(if value { "true" } else { "false" });
        self.needs_comma = true;
        self
    }

    pub fn string_field(&mut self, key: &str, value: &str) -> &mut Self {
        self.key(key).string_value(value)
    }

    pub fn raw_field(&mut self, key: &str, raw: &str) -> &mut Self {
        self.key(key).raw_value(raw)
    }

    pub fn uint_field(&mut self, key: &str, value: u64) -> &mut Self {
        self.key(key).uint_value(value)
    }

    pub fn bool_field(&mut self, key: &str, value: bool) -> &mut Self {
        self.key(key).bool_value(value)
    }

    pub fn finish(self) -> String {
        self.buf
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}
