//! Compact json output matching the escaping of the legacy archive format
//!
//! Archives written by other tools escape `<`, `>` and `&` as unicode
//! sequences, along with the U+2028 and U+2029 line separators. Files we
//! write share that escaping so their bytes come out identical.

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use std::io;

/// Compact formatter that also escapes html-sensitive characters
#[derive(Clone, Copy, Debug, Default)]
pub struct HtmlSafeFormatter;

impl Formatter for HtmlSafeFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            let escaped = match ch {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..index].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serialize `value` as compact json with html-safe string escaping
pub fn to_vec<T>(value: &T) -> serde_json::Result<Vec<u8>>
where
    T: ?Sized + Serialize,
{
    let mut writer = Vec::with_capacity(128);
    let mut serializer = Serializer::with_formatter(&mut writer, HtmlSafeFormatter);
    value.serialize(&mut serializer)?;
    Ok(writer)
}
