//! PDF Lexer
//!
//! Tokenizes PDF syntax (ISO 32000-1 Section 7.2) straight out of an
//! in-memory byte buffer. Positions are absolute offsets into that buffer,
//! which lets the object parser jump to the offsets recorded in a
//! cross-reference table.

use super::{ParseError, ParseResult};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Literal string `( ... )`, escapes resolved
    String(Vec<u8>),
    /// Hexadecimal string `< ... >`, decoded
    HexString(Vec<u8>),
    /// Name object without the leading slash, `#xx` escapes resolved
    Name(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Stream,
    EndStream,
    Obj,
    EndObj,
    /// The `R` of an `n g R` reference
    R,
    XRef,
    Trailer,
    StartXRef,
    Null,
    Comment(Vec<u8>),
    Eof,
}

/// PDF white-space characters (Table 1).
pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'\x0C' | b'\0')
}

/// PDF delimiter characters (Table 2).
pub fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// PDF Lexer over a byte buffer
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
    token_buffer: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Lexer starting at `position` in `data`
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            data,
            position: position.min(data.len()),
            token_buffer: Vec::new(),
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Current offset. Pushed-back tokens are not accounted for.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
        self.token_buffer.clear();
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Push back a token to be returned by the next call to next_token
    pub fn push_token(&mut self, token: Token) {
        self.token_buffer.push(token);
    }

    /// Get the next token
    pub fn next_token(&mut self) -> ParseResult<Token> {
        if let Some(token) = self.token_buffer.pop() {
            return Ok(token);
        }

        self.skip_whitespace();

        let ch = match self.peek_char() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'%' => Ok(self.read_comment()),
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => self.read_angle_bracket(),
            b'>' => {
                self.consume_char();
                if self.peek_char() == Some(b'>') {
                    self.consume_char();
                    Ok(Token::DictEnd)
                } else {
                    Err(ParseError::syntax(self.position, "Expected '>' after '>'"))
                }
            }
            b'[' => {
                self.consume_char();
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.consume_char();
                Ok(Token::ArrayEnd)
            }
            b'+' | b'-' | b'0'..=b'9' | b'.' => self.read_number(),
            _ if is_regular(ch) => self.read_keyword(),
            _ => Err(ParseError::syntax(
                self.position,
                format!("Unexpected character: {}", ch as char),
            )),
        }
    }

    /// Next token that is not a comment
    pub fn next_significant(&mut self) -> ParseResult<Token> {
        loop {
            match self.next_token()? {
                Token::Comment(_) => continue,
                token => return Ok(token),
            }
        }
    }

    pub fn peek_char(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    fn consume_char(&mut self) -> Option<u8> {
        let ch = self.peek_char();
        if ch.is_some() {
            self.position += 1;
        }
        ch
    }

    /// Skip whitespace and return the number of bytes skipped
    pub fn skip_whitespace(&mut self) -> usize {
        let start = self.position;
        while self.peek_char().is_some_and(is_whitespace) {
            self.position += 1;
        }
        self.position - start
    }

    fn read_comment(&mut self) -> Token {
        self.consume_char();
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' || ch == b'\r' {
                break;
            }
            self.position += 1;
        }
        Token::Comment(self.data[start..self.position].to_vec())
    }

    fn read_name(&mut self) -> ParseResult<Token> {
        self.consume_char();
        let mut name = Vec::new();

        while let Some(ch) = self.peek_char() {
            if !is_regular(ch) {
                break;
            }
            self.consume_char();

            // /A#20B means /A B
            if ch == b'#' {
                let high = self.consume_char().and_then(hex_value);
                let low = self.consume_char().and_then(hex_value);
                match (high, low) {
                    (Some(high), Some(low)) => name.push(high << 4 | low),
                    _ => {
                        return Err(ParseError::syntax(
                            self.position,
                            "Invalid hex code in name",
                        ))
                    }
                }
            } else {
                name.push(ch);
            }
        }

        Ok(Token::Name(String::from_utf8_lossy(&name).into_owned()))
    }

    fn read_literal_string(&mut self) -> ParseResult<Token> {
        self.consume_char();
        let mut string = Vec::new();
        let mut paren_depth = 1;

        while paren_depth > 0 {
            let ch = self
                .consume_char()
                .ok_or_else(|| ParseError::syntax(self.position, "Unterminated string"))?;

            match ch {
                b'\\' => {
                    let escaped = self
                        .consume_char()
                        .ok_or_else(|| ParseError::syntax(self.position, "Unterminated string"))?;
                    match escaped {
                        b'n' => string.push(b'\n'),
                        b'r' => string.push(b'\r'),
                        b't' => string.push(b'\t'),
                        b'b' => string.push(b'\x08'),
                        b'f' => string.push(b'\x0C'),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek_char() {
                                    Some(next @ b'0'..=b'7') => {
                                        self.consume_char();
                                        value = value * 8 + u32::from(next - b'0');
                                    }
                                    _ => break,
                                }
                            }
                            string.push((value & 0xFF) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if self.peek_char() == Some(b'\n') {
                                self.consume_char();
                            }
                        }
                        b'\n' => {}
                        other => string.push(other),
                    }
                }
                b'(' => {
                    paren_depth += 1;
                    string.push(ch);
                }
                b')' => {
                    paren_depth -= 1;
                    if paren_depth > 0 {
                        string.push(ch);
                    }
                }
                _ => string.push(ch),
            }
        }

        Ok(Token::String(string))
    }

    fn read_angle_bracket(&mut self) -> ParseResult<Token> {
        self.consume_char();

        if self.peek_char() == Some(b'<') {
            self.consume_char();
            return Ok(Token::DictStart);
        }

        let mut nibbles = Vec::new();
        loop {
            let ch = self
                .consume_char()
                .ok_or_else(|| ParseError::syntax(self.position, "Unterminated hex string"))?;
            if ch == b'>' {
                break;
            }
            if let Some(value) = hex_value(ch) {
                nibbles.push(value);
            } else if !is_whitespace(ch) {
                return Err(ParseError::syntax(
                    self.position,
                    "Invalid character in hex string",
                ));
            }
        }

        // Odd number of digits: the final digit is followed by an implicit 0
        if nibbles.len() % 2 != 0 {
            nibbles.push(0);
        }

        let bytes = nibbles
            .chunks(2)
            .map(|pair| pair[0] << 4 | pair[1])
            .collect();
        Ok(Token::HexString(bytes))
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let mut has_dot = false;

        if matches!(self.peek_char(), Some(b'+' | b'-')) {
            self.consume_char();
        }

        while let Some(ch) = self.peek_char() {
            match ch {
                b'0'..=b'9' => {
                    self.consume_char();
                }
                b'.' if !has_dot => {
                    self.consume_char();
                    has_dot = true;
                }
                _ => break,
            }
        }

        let text = String::from_utf8_lossy(&self.data[start..self.position]);
        let digits = text.trim_start_matches(['+', '-']);
        if digits.is_empty() || digits == "." {
            return Err(ParseError::syntax(
                start,
                format!("Invalid number: '{text}'"),
            ));
        }

        if has_dot {
            // "4." and "-.5" are valid PDF reals
            let normalized = if text.ends_with('.') {
                format!("{text}0")
            } else {
                text.replace("-.", "-0.").replace("+.", "0.")
            };
            normalized
                .parse::<f64>()
                .map(Token::Real)
                .map_err(|_| ParseError::syntax(start, format!("Invalid real number: '{text}'")))
        } else {
            match text.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(value)),
                // Out of range integers degrade to reals
                Err(_) => text
                    .parse::<f64>()
                    .map(Token::Real)
                    .map_err(|_| ParseError::syntax(start, format!("Invalid integer: '{text}'"))),
            }
        }
    }

    fn read_keyword(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let word = self.read_word();
        match word {
            b"true" => Ok(Token::Boolean(true)),
            b"false" => Ok(Token::Boolean(false)),
            b"null" => Ok(Token::Null),
            b"R" => Ok(Token::R),
            b"obj" => Ok(Token::Obj),
            b"endobj" => Ok(Token::EndObj),
            b"stream" => Ok(Token::Stream),
            b"endstream" => Ok(Token::EndStream),
            b"xref" => Ok(Token::XRef),
            b"trailer" => Ok(Token::Trailer),
            b"startxref" => Ok(Token::StartXRef),
            _ => Err(ParseError::syntax(
                start,
                format!("Unknown keyword: {}", String::from_utf8_lossy(word)),
            )),
        }
    }

    /// Read a word (sequence of regular characters)
    fn read_word(&mut self) -> &'a [u8] {
        let start = self.position;
        while self.peek_char().is_some_and(is_regular) {
            self.position += 1;
        }
        &self.data[start..self.position]
    }

    /// Read the end-of-line marker after the `stream` keyword.
    ///
    /// The marker must be CRLF or LF. A lone CR is accepted as well.
    pub fn read_newline(&mut self) -> ParseResult<()> {
        match self.peek_char() {
            Some(b'\r') => {
                self.consume_char();
                if self.peek_char() == Some(b'\n') {
                    self.consume_char();
                }
                Ok(())
            }
            Some(b'\n') => {
                self.consume_char();
                Ok(())
            }
            _ => Err(ParseError::syntax(self.position, "Expected newline")),
        }
    }

    /// Read exactly n bytes
    pub fn read_bytes(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(ParseError::UnexpectedEof)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Offset of the next occurrence of `sequence` at or after the
    /// current position, without consuming anything
    pub fn find_ahead(&self, sequence: &[u8]) -> Option<usize> {
        find_bytes(&self.data[self.position..], sequence).map(|index| self.position + index)
    }

    /// Expect a specific token
    pub fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let token = self.next_significant()?;
        if token == expected {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("{expected:?}"),
                found: format!("{token:?}"),
            })
        }
    }
}

fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// First index of `needle` in `haystack`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Last index of `needle` in `haystack`.
pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}
