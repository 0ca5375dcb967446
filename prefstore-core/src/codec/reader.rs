//! Recursive-descent parser for the settings text format.

use crate::error::{ParseError, ParseErrorKind, Position};
use crate::value::{Key, Value, ValueMap};
use num_bigint::BigInt;

/// Deepest list/map nesting accepted before giving up
pub const MAX_DEPTH: usize = 128;

/// Longest integer literal accepted, in digits
pub const MAX_INTEGER_DIGITS: usize = 4096;

/// Parse settings text into a value tree
///
/// Accepts JSON objects, arrays, strings, booleans and integers, with `//` line
/// comments and `/* */` block comments between any two tokens. Trailing commas
/// before a closing bracket are tolerated.
pub fn parse(text: &str) -> Result<Value, ParseError> {
    let mut reader = Reader::new(text);
    reader.skip_bom();
    reader.skip_trivia()?;
    let value = reader.parse_value(0)?;
    reader.skip_trivia()?;
    if reader.pos < reader.bytes.len() {
        return Err(reader.error(ParseErrorKind::TrailingContent));
    }
    Ok(value)
}

struct Reader<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        self.error_at(kind, self.pos)
    }

    fn error_at(&self, kind: ParseErrorKind, offset: usize) -> ParseError {
        ParseError::new(kind, Position::locate(self.text, offset))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn unexpected(&self) -> ParseError {
        match self.peek_char() {
            Some(c) => self.error(ParseErrorKind::UnexpectedCharacter(c)),
            None => self.error(ParseErrorKind::UnexpectedEof),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn skip_bom(&mut self) {
        if self.text.starts_with('\u{feff}') {
            self.pos += '\u{feff}'.len_utf8();
        }
    }

    /// Skip whitespace and comments
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\n' | b'\r') => self.pos += 1,
                Some(b'/') => match self.bytes.get(self.pos + 1) {
                    Some(b'/') => {
                        self.pos += 2;
                        while let Some(b) = self.peek() {
                            if b == b'\n' {
                                break;
                            }
                            self.pos += 1;
                        }
                    }
                    Some(b'*') => {
                        let start = self.pos;
                        self.pos += 2;
                        match self.text[self.pos..].find("*/") {
                            Some(end) => self.pos += end + 2,
                            None => {
                                return Err(self.error_at(ParseErrorKind::UnterminatedComment, start))
                            }
                        }
                    }
                    _ => return Err(self.unexpected()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, ParseError> {
        match self.peek() {
            None => Err(self.error(ParseErrorKind::UnexpectedEof)),
            Some(b'{') => self.parse_map(depth + 1),
            Some(b'[') => self.parse_list(depth + 1),
            Some(b'"') => self.parse_string().map(Value::String),
            Some(b't') => self.parse_literal("true", Value::Boolean(true)),
            Some(b'f') => self.parse_literal("false", Value::Boolean(false)),
            Some(b'n') if self.text[self.pos..].starts_with("null") => {
                Err(self.error(ParseErrorKind::UnsupportedNull))
            }
            Some(b'-' | b'0'..=b'9') => self.parse_integer(),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Result<Value, ParseError> {
        if !self.text[self.pos..].starts_with(word) {
            return Err(self.unexpected());
        }
        let end = self.pos + word.len();
        // Reject run-ons such as `trueish`
        if let Some(next) = self.bytes.get(end) {
            if next.is_ascii_alphanumeric() || *next == b'_' {
                return Err(self.error_at(ParseErrorKind::UnexpectedCharacter(*next as char), end));
            }
        }
        self.pos = end;
        Ok(value)
    }

    fn parse_integer(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let digits = self.pos - digits_start;

        if digits == 0 {
            return Err(self.error_at(ParseErrorKind::InvalidNumber, start));
        }
        if digits > 1 && self.bytes[digits_start] == b'0' {
            return Err(self.error_at(ParseErrorKind::InvalidNumber, start));
        }
        // Fractions and exponents have no representation in the value model
        if matches!(self.peek(), Some(b'.' | b'e' | b'E')) {
            return Err(self.error_at(ParseErrorKind::InvalidNumber, start));
        }
        if matches!(self.peek(), Some(b) if b.is_ascii_alphabetic() || b == b'_') {
            return Err(self.error_at(ParseErrorKind::InvalidNumber, start));
        }
        if digits > MAX_INTEGER_DIGITS {
            return Err(self.error_at(ParseErrorKind::NumberOutOfRange, start));
        }

        self.text[start..self.pos]
            .parse::<BigInt>()
            .map(Value::Integer)
            .map_err(|_| self.error_at(ParseErrorKind::InvalidNumber, start))
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            let run_start = self.pos;
            while let Some(b) = self.peek() {
                if b == b'"' || b == b'\\' || b < 0x20 {
                    break;
                }
                self.pos += 1;
            }
            // Only ASCII bytes stop the run, so this slice is on char boundaries
            out.push_str(&self.text[run_start..self.pos]);

            match self.peek() {
                None => return Err(self.error(ParseErrorKind::UnexpectedEof)),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let c = self.parse_escape()?;
                    out.push(c);
                }
                Some(_) => return Err(self.error(ParseErrorKind::ControlCharacter)),
            }
        }
    }

    fn parse_escape(&mut self) -> Result<char, ParseError> {
        let escape_start = self.pos - 1;
        let c = match self.peek() {
            None => return Err(self.error(ParseErrorKind::UnexpectedEof)),
            Some(b'"') => '"',
            Some(b'\\') => '\\',
            Some(b'/') => '/',
            Some(b'b') => '\u{8}',
            Some(b'f') => '\u{c}',
            Some(b'n') => '\n',
            Some(b'r') => '\r',
            Some(b't') => '\t',
            Some(b'u') => {
                self.pos += 1;
                return self.parse_unicode_escape(escape_start);
            }
            Some(_) => return Err(self.error_at(ParseErrorKind::InvalidEscape, escape_start)),
        };
        self.pos += 1;
        Ok(c)
    }

    fn parse_hex4(&mut self, escape_start: usize) -> Result<u32, ParseError> {
        let hex = self
            .text
            .get(self.pos..self.pos + 4)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| self.error_at(ParseErrorKind::InvalidEscape, escape_start))?;
        let code = u32::from_str_radix(hex, 16)
            .map_err(|_| self.error_at(ParseErrorKind::InvalidEscape, escape_start))?;
        self.pos += 4;
        Ok(code)
    }

    fn parse_unicode_escape(&mut self, escape_start: usize) -> Result<char, ParseError> {
        let first = self.parse_hex4(escape_start)?;
        let code = match first {
            0xD800..=0xDBFF => {
                if !self.text[self.pos..].starts_with("\\u") {
                    return Err(self.error_at(ParseErrorKind::InvalidEscape, escape_start));
                }
                self.pos += 2;
                let second = self.parse_hex4(escape_start)?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(self.error_at(ParseErrorKind::InvalidEscape, escape_start));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(self.error_at(ParseErrorKind::InvalidEscape, escape_start))
            }
            code => code,
        };
        char::from_u32(code).ok_or_else(|| self.error_at(ParseErrorKind::InvalidEscape, escape_start))
    }

    fn parse_list(&mut self, depth: usize) -> Result<Value, ParseError> {
        if depth > MAX_DEPTH {
            return Err(self.error(ParseErrorKind::NestingTooDeep));
        }
        self.expect(b'[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.peek() == Some(b']') {
                self.pos += 1;
                return Ok(Value::List(items));
            }
            items.push(self.parse_value(depth)?);
            self.skip_trivia()?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_map(&mut self, depth: usize) -> Result<Value, ParseError> {
        if depth > MAX_DEPTH {
            return Err(self.error(ParseErrorKind::NestingTooDeep));
        }
        self.expect(b'{')?;
        let mut entries = ValueMap::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Map(entries));
                }
                Some(b'"') => {}
                _ => return Err(self.unexpected()),
            }

            let key_start = self.pos;
            let raw_key = self.parse_string()?;
            let key = Key::new(raw_key)
                .map_err(|e| self.error_at(ParseErrorKind::InvalidKey(e), key_start))?;
            if entries.contains_key(key.as_str()) {
                return Err(self.error_at(
                    ParseErrorKind::DuplicateKey(key.into_string()),
                    key_start,
                ));
            }

            self.skip_trivia()?;
            self.expect(b':')?;
            self.skip_trivia()?;
            let value = self.parse_value(depth)?;
            entries.insert(key, value);

            self.skip_trivia()?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Map(entries));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }
}
