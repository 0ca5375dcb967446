//! Serializer for the settings text format.

use crate::schema::Schema;
use crate::value::{Value, ValueMap};
use std::fmt::Write as _;

const INDENT: &str = "  ";

/// Layout of the emitted text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    /// Single line, no insignificant whitespace
    Compact,
    /// One entry per line, two-space indentation
    #[default]
    Indented,
}

/// Configurable serializer
///
/// Map entries are always emitted in key order, so equal values produce
/// byte-identical text.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    style: Style,
    header: Option<String>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Emit `header` as `//` comment lines before the root value
    pub fn header<S: Into<String>>(mut self, header: S) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Serialize any value tree
    pub fn write(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_header(&mut out);
        write_value(&mut out, value, self.style, 0);
        if self.style == Style::Indented {
            out.push('\n');
        }
        out
    }

    /// Serialize a settings document with each property's documentation
    /// rendered as comments above its live value
    ///
    /// Entries without schema documentation are written bare. Always indented.
    pub fn write_documented(&self, schema: &Schema, entries: &ValueMap) -> String {
        let mut out = String::new();
        self.write_header(&mut out);
        if entries.is_empty() {
            out.push_str("{}\n");
            return out;
        }
        out.push_str("{\n");
        let last = entries.len() - 1;
        for (i, (key, value)) in entries.iter().enumerate() {
            if let Some(doc) = schema.descriptor(key.as_str()).and_then(|d| d.doc.as_deref()) {
                write_doc_lines(&mut out, doc);
            }
            out.push_str(INDENT);
            write_string(&mut out, key.as_str());
            out.push_str(": ");
            write_value(&mut out, value, Style::Indented, 1);
            if i != last {
                out.push(',');
            }
            out.push('\n');
        }
        out.push_str("}\n");
        out
    }

    /// Render every schema property as an inactive example line
    ///
    /// The result parses to an empty map; users uncomment the entries they want
    /// to override. Properties without a default are listed as `(no default)`.
    pub fn write_template(&self, schema: &Schema, defaults: &ValueMap) -> String {
        let mut out = String::new();
        self.write_header(&mut out);
        out.push_str("{\n");
        for descriptor in schema.descriptors() {
            if let Some(doc) = descriptor.doc.as_deref() {
                write_doc_lines(&mut out, doc);
            }
            out.push_str(INDENT);
            out.push_str("// ");
            write_string(&mut out, descriptor.key.as_str());
            out.push_str(": ");
            match defaults.get(descriptor.key.as_str()) {
                Some(value) => {
                    write_value(&mut out, value, Style::Compact, 0);
                    out.push(',');
                }
                None => out.push_str("(no default)"),
            }
            out.push('\n');
        }
        out.push_str("}\n");
        out
    }

    fn write_header(&self, out: &mut String) {
        if let Some(header) = &self.header {
            for line in header.lines() {
                push_comment_line(out, line);
            }
        }
    }
}

/// Serialize `value` with the default writer configuration and `style`
pub fn write(value: &Value, style: Style) -> String {
    Writer::new().style(style).write(value)
}

fn push_comment_line(out: &mut String, line: &str) {
    if line.is_empty() {
        out.push_str("//\n");
    } else {
        out.push_str("// ");
        out.push_str(line);
        out.push('\n');
    }
}

fn write_doc_lines(out: &mut String, doc: &str) {
    for line in doc.lines() {
        out.push_str(INDENT);
        push_comment_line(out, line);
    }
}

fn newline(out: &mut String, level: usize) {
    out.push('\n');
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn write_value(out: &mut String, value: &Value, style: Style, level: usize) {
    match value {
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_string(out, s),
        Value::List(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if style == Style::Indented {
                    newline(out, level + 1);
                }
                write_value(out, item, style, level + 1);
            }
            if style == Style::Indented {
                newline(out, level);
            }
            out.push(']');
        }
        Value::Map(entries) => {
            if entries.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push('{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if style == Style::Indented {
                    newline(out, level + 1);
                }
                write_string(out, key.as_str());
                out.push(':');
                if style == Style::Indented {
                    out.push(' ');
                }
                write_value(out, item, style, level + 1);
            }
            if style == Style::Indented {
                newline(out, level);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
