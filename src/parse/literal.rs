//! Restricted object-literal parser for `response:` payloads.
//!
//! Farmer and pool responses are logged as the repr of a dictionary, e.g.
//! `{'name': 'Pool', 'fee': 0.01, 'enabled': True}`. The payload comes straight
//! from a log file, so it is untrusted: this module decodes a fixed grammar of
//! plain data and rejects everything else. Nothing is ever evaluated.
//!
//! Accepted grammar:
//!
//! ```text
//! value   := object | list | tuple | string | number | keyword
//! object  := '{' (string ':' value (',' string ':' value)* ','?)? '}'
//! list    := '[' (value (',' value)* ','?)? ']'
//! tuple   := '(' (value (',' value)* ','?)? ')'
//! string  := '\'' ... '\'' | '"' ... '"'       (backslash escapes)
//! number  := [+-]? digits ('.' digits)? ([eE] [+-]? digits)?
//! keyword := True | False | None | true | false | null
//! ```
//!
//! Decoded values use `serde_json::Value` so callers can deserialize typed
//! structs out of them with serde.

#![allow(missing_docs)]

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Maximum nesting of objects/lists/tuples.
pub const MAX_DEPTH: usize = 64;

/// A rejected payload, with the byte offset where parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at byte {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub kind: LiteralErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("bare identifier `{0}` is not a literal")]
    Identifier(String),
    #[error("object keys must be strings")]
    NonStringKey,
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("nesting deeper than {} levels", MAX_DEPTH)]
    TooDeep,
    #[error("trailing input after literal")]
    TrailingInput,
    #[error("top-level value is not an object")]
    NotAnObject,
}

/// Parse a brace-delimited object literal into a string-keyed map.
///
/// Leading and trailing whitespace is ignored; anything else after the closing
/// brace is an error.
pub fn parse_literal_object(text: &str) -> Result<Map<String, Value>, LiteralError> {
    let mut parser = Parser::new(text);
    parser.skip_ws();
    if parser.peek() != Some('{') {
        return Err(parser.error(LiteralErrorKind::NotAnObject));
    }
    let object = parser.object()?;
    parser.finish()?;
    Ok(object)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    const fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    const fn error(&self, kind: LiteralErrorKind) -> LiteralError {
        LiteralError {
            offset: self.pos,
            kind,
        }
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek() {
            Some(c) => self.error(LiteralErrorKind::UnexpectedChar(c)),
            None => self.error(LiteralErrorKind::UnexpectedEnd),
        }
    }

    fn finish(&mut self) -> Result<(), LiteralError> {
        self.skip_ws();
        if self.pos == self.src.len() {
            Ok(())
        } else {
            Err(self.error(LiteralErrorKind::TrailingInput))
        }
    }

    fn enter(&mut self) -> Result<(), LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(LiteralErrorKind::TooDeep));
        }
        self.depth += 1;
        Ok(())
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error(LiteralErrorKind::UnexpectedEnd)),
            Some('{') => self.object().map(Value::Object),
            Some('[') => self.sequence(']').map(Value::Array),
            Some('(') => self.sequence(')').map(Value::Array),
            Some(quote @ ('\'' | '"')) => self.string(quote).map(Value::String),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.keyword(),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn object(&mut self) -> Result<Map<String, Value>, LiteralError> {
        self.enter()?;
        self.bump(); // '{'
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    break;
                }
                Some(quote @ ('\'' | '"')) => {
                    let key = self.string(quote)?;
                    self.skip_ws();
                    if self.peek() != Some(':') {
                        return Err(self.unexpected());
                    }
                    self.bump();
                    let value = self.value()?;
                    map.insert(key, value);
                }
                Some(_) => return Err(self.error(LiteralErrorKind::NonStringKey)),
                None => return Err(self.error(LiteralErrorKind::UnexpectedEnd)),
            }
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.unexpected()),
            }
        }
        self.depth -= 1;
        Ok(map)
    }

    fn sequence(&mut self, close: char) -> Result<Vec<Value>, LiteralError> {
        self.enter()?;
        self.bump(); // '[' or '('
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                break;
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {
                    self.bump();
                    break;
                }
                _ => return Err(self.unexpected()),
            }
        }
        self.depth -= 1;
        Ok(items)
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(LiteralError {
                    offset: start,
                    kind: LiteralErrorKind::UnterminatedString,
                });
            };
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escaped = match self.bump() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('0') => '\0',
                Some('b') => '\u{8}',
                Some('f') => '\u{c}',
                Some(c @ ('\\' | '\'' | '"' | '/')) => c,
                Some('x') => self.hex_escape(2)?,
                Some('u') => self.hex_escape(4)?,
                Some('U') => self.hex_escape(8)?,
                _ => return Err(self.error(LiteralErrorKind::InvalidEscape)),
            };
            out.push(escaped);
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let end = self.pos + digits;
        let raw = self
            .src
            .get(self.pos..end)
            .ok_or_else(|| self.error(LiteralErrorKind::InvalidEscape))?;
        let code = u32::from_str_radix(raw, 16)
            .map_err(|_| self.error(LiteralErrorKind::InvalidEscape))?;
        let c = char::from_u32(code).ok_or_else(|| self.error(LiteralErrorKind::InvalidEscape))?;
        self.pos = end;
        Ok(c)
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw = &self.src[start..self.pos];
        let invalid = || LiteralError {
            offset: start,
            kind: LiteralErrorKind::InvalidNumber(raw.to_string()),
        };

        if !raw.contains(['.', 'e', 'E']) {
            if let Ok(n) = raw.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
            if let Ok(n) = raw.parse::<u64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        // Fractions, exponents, and integers wider than 64 bits.
        let float = raw.parse::<f64>().map_err(|_| invalid())?;
        Number::from_f64(float)
            .map(Value::Number)
            .ok_or_else(invalid)
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        match &self.src[start..self.pos] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => Err(LiteralError {
                offset: start,
                kind: LiteralErrorKind::Identifier(other.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_pool_info_repr() {
        let payload = "{'description': 'Friendly pool (@poolops)', 'fee': 0.01, \
                       'name': 'Example Pool', 'protocol_version': 1, 'minimum_difficulty': 1, \
                       'relative_lock_height': 100, 'target_puzzle_hash': '0xabc'}";
        let map = parse_literal_object(payload).unwrap();
        assert_eq!(map["name"], "Example Pool");
        assert_eq!(map["fee"], 0.01);
        assert_eq!(map["protocol_version"], 1);
        assert_eq!(map["description"], "Friendly pool (@poolops)");
    }

    #[test]
    fn parses_keywords_in_both_spellings() {
        let map =
            parse_literal_object(r#"{"a": True, "b": false, "c": None, "d": null, "e": true}"#)
                .unwrap();
        assert_eq!(map["a"], true);
        assert_eq!(map["b"], false);
        assert!(map["c"].is_null());
        assert!(map["d"].is_null());
        assert_eq!(map["e"], true);
    }

    #[test]
    fn parses_nested_containers_and_tuples() {
        let map = parse_literal_object("{'a': {'b': [1, -2, 3.5e2]}, 't': (1, 'x',), 'e': {}}")
            .unwrap();
        assert_eq!(map["a"]["b"][1], -2);
        assert_eq!(map["a"]["b"][2], 350.0);
        assert_eq!(map["t"][1], "x");
        assert!(map["e"].as_object().unwrap().is_empty());
    }

    #[test]
    fn decodes_escapes() {
        let map = parse_literal_object(r"{'q': 'it\'s \x41é\n'}").unwrap();
        assert_eq!(map["q"], "it's A\u{e9}\n");
    }

    #[test]
    fn huge_integers_degrade_to_floats() {
        let map = parse_literal_object("{'big': 123456789012345678901234567890}").unwrap();
        assert!(map["big"].is_f64());
    }

    #[test]
    fn rejects_function_calls() {
        let err = parse_literal_object("{'name': __import__('os').system('rm -rf /')}")
            .unwrap_err();
        assert_eq!(
            err.kind,
            LiteralErrorKind::Identifier("__import__".to_string())
        );
        assert_eq!(err.offset, 9);
    }

    #[test]
    fn rejects_bare_identifiers_and_expressions() {
        for payload in [
            "{'a': open}",
            "{'a': lambda: 1}",
            "{'a': 1 + 2}",
            "{'a': [x for x in y]}",
            "{'a': inf}",
            "{'a': nan}",
            "{'a': b'bytes'}",
        ] {
            assert!(
                parse_literal_object(payload).is_err(),
                "should reject {payload}"
            );
        }
    }

    #[test]
    fn rejects_non_string_keys() {
        let err = parse_literal_object("{name: 'x'}").unwrap_err();
        assert_eq!(err.kind, LiteralErrorKind::NonStringKey);
        assert!(parse_literal_object("{1: 'x'}").is_err());
    }

    #[test]
    fn rejects_trailing_input_and_non_objects() {
        assert_eq!(
            parse_literal_object("{'a': 1} ; print(1)").unwrap_err().kind,
            LiteralErrorKind::TrailingInput
        );
        assert_eq!(
            parse_literal_object("[1, 2]").unwrap_err().kind,
            LiteralErrorKind::NotAnObject
        );
        assert!(parse_literal_object("").is_err());
    }

    #[test]
    fn rejects_unterminated_structures() {
        assert_eq!(
            parse_literal_object("{'a': 'oops}").unwrap_err().kind,
            LiteralErrorKind::UnterminatedString
        );
        assert_eq!(
            parse_literal_object("{'a': 1").unwrap_err().kind,
            LiteralErrorKind::UnexpectedEnd
        );
        assert!(parse_literal_object("{'a' 1}").is_err());
        assert!(parse_literal_object("{'a': 1 'b': 2}").is_err());
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert_eq!(
            parse_literal_object("{'v': 1.2.3}").unwrap_err().kind,
            LiteralErrorKind::InvalidNumber("1.2.3".to_string())
        );
        assert!(parse_literal_object("{'v': --1}").is_err());
    }

    #[test]
    fn nesting_is_bounded() {
        // The enclosing object is one level.
        let nested = |n: usize| format!("{{'v': {}1{}}}", "[".repeat(n), "]".repeat(n));
        assert_eq!(
            parse_literal_object(&nested(MAX_DEPTH)).unwrap_err().kind,
            LiteralErrorKind::TooDeep
        );
        assert!(parse_literal_object(&nested(MAX_DEPTH - 1)).is_ok());
    }

    #[test]
    fn error_display_names_offset() {
        let err = parse_literal_object("{'a': exec}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exec"), "{msg}");
        assert!(msg.contains("byte 6"), "{msg}");
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_input(input in "\\PC{0,64}") {
            let _ = parse_literal_object(&input);
        }

        #[test]
        fn identifier_values_are_always_rejected(ident in "[a-zA-Z_][a-zA-Z0-9_]{0,12}") {
            prop_assume!(!matches!(
                ident.as_str(),
                "True" | "False" | "None" | "true" | "false" | "null"
            ));
            let payload = format!("{{'k': {ident}('x')}}");
            prop_assert!(parse_literal_object(&payload).is_err());
        }

        #[test]
        fn integer_values_survive(n in any::<i64>()) {
            let map = parse_literal_object(&format!("{{'n': {n}}}")).unwrap();
            prop_assert_eq!(map["n"].as_i64(), Some(n));
        }
    }
}
