//! In-memory property-list values and their textual description

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use chrono::{DateTime, Utc};

/// Seconds between the UNIX epoch and the plist reference date (2001-01-01)
const REFERENCE_DATE_OFFSET: i64 = 978_307_200;

/// Data longer than this is abbreviated in descriptions
const DATA_PREVIEW_LIMIT: usize = 24;
const DATA_PREVIEW_EDGE: usize = 8;

const INDENT: &str = "    ";

/// A decoded property-list value
#[derive(Debug, Clone, PartialEq)]
pub enum Plist {
    Null,
    Boolean(bool),
    Integer(i128),
    Real(f64),
    /// Seconds relative to 2001-01-01 00:00:00 UTC
    Date(f64),
    Data(Vec<u8>),
    String(String),
    Uid(u64),
    Array(Vec<Plist>),
    Set(Vec<Plist>),
    Dictionary(BTreeMap<String, Plist>),
}

impl Plist {
    pub fn as_dictionary(&self) -> Option<&BTreeMap<String, Plist>> {
        match self {
            Plist::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    pub fn get(&self, key: &str) -> Option<&Plist> {
        self.as_dictionary().and_then(|d| d.get(key))
    }

    /// OpenStep-style description, as Foundation prints it
    pub fn description(&self) -> String {
        self.to_string()
    }

    fn write_description(&self, out: &mut impl Write, depth: usize) -> fmt::Result {
        match self {
            Plist::Null => out.write_str("<null>"),
            Plist::Boolean(b) => out.write_str(if *b { "1" } else { "0" }),
            Plist::Integer(i) => write!(out, "{}", i),
            Plist::Real(r) => write!(out, "{}", r),
            Plist::Date(secs) => write_date(out, *secs),
            Plist::Data(bytes) => write_data(out, bytes),
            Plist::String(s) => write_string(out, s),
            Plist::Uid(v) => write!(out, "<CFKeyedArchiverUID>{{value = {}}}", v),
            Plist::Array(items) => write_sequence(out, items, depth, "(", ")"),
            Plist::Set(items) => write_sequence(out, items, depth, "{(", ")}"),
            Plist::Dictionary(entries) => {
                out.write_str("{\n")?;
                for (key, value) in entries {
                    write_indent(out, depth + 1)?;
                    write_string(out, key)?;
                    out.write_str(" = ")?;
                    value.write_description(out, depth + 1)?;
                    out.write_str(";\n")?;
                }
                write_indent(out, depth)?;
                out.write_char('}')
            }
        }
    }
}

impl fmt::Display for Plist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_description(f, 0)
    }
}

fn write_indent(out: &mut impl Write, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        out.write_str(INDENT)?;
    }
    Ok(())
}

fn write_sequence(
    out: &mut impl Write,
    items: &[Plist],
    depth: usize,
    open: &str,
    close: &str,
) -> fmt::Result {
    out.write_str(open)?;
    out.write_char('\n')?;
    for (i, item) in items.iter().enumerate() {
        write_indent(out, depth + 1)?;
        item.write_description(out, depth + 1)?;
        if i + 1 < items.len() {
            out.write_char(',')?;
        }
        out.write_char('\n')?;
    }
    write_indent(out, depth)?;
    out.write_str(close)
}

/// Bare words are printed unquoted; anything else is quoted and escaped.
fn write_string(out: &mut impl Write, s: &str) -> fmt::Result {
    let bare = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | ':' | '/'));
    if bare {
        return out.write_str(s);
    }

    out.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\t' => out.write_str("\\t")?,
            _ => out.write_char(c)?,
        }
    }
    out.write_char('"')
}

fn write_data(out: &mut impl Write, bytes: &[u8]) -> fmt::Result {
    write!(out, "{{length = {}, bytes = 0x", bytes.len())?;
    if bytes.len() <= DATA_PREVIEW_LIMIT {
        for b in bytes {
            write!(out, "{:02x}", b)?;
        }
    } else {
        for b in &bytes[..DATA_PREVIEW_EDGE] {
            write!(out, "{:02x}", b)?;
        }
        out.write_str(" ... ")?;
        for b in &bytes[bytes.len() - DATA_PREVIEW_EDGE..] {
            write!(out, "{:02x}", b)?;
        }
    }
    out.write_char('}')
}

fn write_date(out: &mut impl Write, secs: f64) -> fmt::Result {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    let date = (whole as i64)
        .checked_add(REFERENCE_DATE_OFFSET)
        .and_then(|unix| DateTime::<Utc>::from_timestamp(unix, nanos));

    match date {
        Some(date) if secs.is_finite() => write!(out, "{}", date.format("%Y-%m-%d %H:%M:%S %z")),
        _ => write!(out, "<date {}>", secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, Plist)]) -> Plist {
        Plist::Dictionary(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_dictionary_description() {
        let plist = dict(&[
            ("name", Plist::String("sync".to_string())),
            ("count", Plist::Integer(3)),
        ]);
        assert_eq!(plist.description(), "{\n    count = 3;\n    name = sync;\n}");
    }

    #[test]
    fn test_nested_description() {
        let plist = dict(&[(
            "outer",
            dict(&[(
                "items",
                Plist::Array(vec![Plist::Boolean(true), Plist::Real(0.5)]),
            )]),
        )]);
        let expected = "{\n    outer = {\n        items = (\n            1,\n            0.5\n        );\n    };\n}";
        assert_eq!(plist.description(), expected);
    }

    #[test]
    fn test_string_quoting() {
        assert_eq!(Plist::String("com.apple.foo".into()).description(), "com.apple.foo");
        assert_eq!(Plist::String("two words".into()).description(), "\"two words\"");
        assert_eq!(Plist::String(String::new()).description(), "\"\"");
        assert_eq!(Plist::String("a\"b".into()).description(), "\"a\\\"b\"");
    }

    #[test]
    fn test_data_description() {
        assert_eq!(
            Plist::Data(vec![0xde, 0xad]).description(),
            "{length = 2, bytes = 0xdead}"
        );

        let long: Vec<u8> = (0..32).collect();
        assert_eq!(
            Plist::Data(long).description(),
            "{length = 32, bytes = 0x0001020304050607 ... 18191a1b1c1d1e1f}"
        );
    }

    #[test]
    fn test_date_description() {
        assert_eq!(Plist::Date(0.0).description(), "2001-01-01 00:00:00 +0000");
        assert_eq!(Plist::Date(86400.0).description(), "2001-01-02 00:00:00 +0000");
        assert_eq!(Plist::Date(f64::NAN).description(), "<date NaN>");
    }

    #[test]
    fn test_empty_containers_and_scalars() {
        assert_eq!(Plist::Array(vec![]).description(), "(\n)");
        assert_eq!(Plist::Set(vec![Plist::Integer(1)]).description(), "{(\n    1\n)}");
        assert_eq!(dict(&[]).description(), "{\n}");
        assert_eq!(Plist::Null.description(), "<null>");
        assert_eq!(Plist::Uid(4).description(), "<CFKeyedArchiverUID>{value = 4}");
    }
}
