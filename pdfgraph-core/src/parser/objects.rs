//! PDF Object Parser
//!
//! Builds [`Object`] values from tokens (ISO 32000-1 Section 7.3) and reads
//! indirect object definitions `n g obj ... endobj`, including stream bodies.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseResult};
use crate::objects::{Dictionary, Object, ObjectId, StringFormat, Stream};
use tracing::warn;

/// Maximum nesting of direct arrays and dictionaries inside one object.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Looks up the value of an indirect `/Length`.
pub type LengthResolver<'r> = dyn Fn(ObjectId) -> Option<i64> + 'r;

pub struct ObjectParser<'a, 'r> {
    lexer: Lexer<'a>,
    lenient: bool,
    length_resolver: Option<&'r LengthResolver<'r>>,
}

impl<'a, 'r> ObjectParser<'a, 'r> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            lexer: Lexer::at(data, position),
            lenient: false,
            length_resolver: None,
        }
    }

    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_length_resolver(mut self, resolver: &'r LengthResolver<'r>) -> Self {
        self.length_resolver = Some(resolver);
        self
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    pub fn lexer_mut(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Parses one direct object at `offset`.
    pub fn parse_object_at(data: &'a [u8], offset: usize) -> ParseResult<Object> {
        ObjectParser::at(data, offset).parse_object()
    }

    /// Parses the indirect object defined at `offset`.
    pub fn parse_indirect_at(data: &'a [u8], offset: usize) -> ParseResult<(ObjectId, Object)> {
        ObjectParser::at(data, offset).parse_indirect()
    }

    /// Parses the next direct object.
    pub fn parse_object(&mut self) -> ParseResult<Object> {
        let token = self.lexer.next_significant()?;
        self.parse_from_token(token, 0)
    }

    /// Parses `n g obj <object> endobj` at the current position.
    pub fn parse_indirect(&mut self) -> ParseResult<(ObjectId, Object)> {
        let start = self.lexer.position();
        let number = self.expect_integer("object number")?;
        let generation = self.expect_integer("generation number")?;
        let id = object_id(number, generation).ok_or_else(|| {
            ParseError::syntax(start, format!("Invalid object identifier {number} {generation}"))
        })?;
        self.lexer.expect(Token::Obj)?;

        let object = match self.parse_object()? {
            Object::Dictionary(dict) => self.parse_optional_stream(id, dict)?,
            other => other,
        };

        let before_end = self.lexer.position();
        match self.lexer.next_significant() {
            Ok(Token::EndObj) => {}
            Ok(token) if !self.lenient => {
                return Err(ParseError::UnexpectedToken {
                    expected: "endobj".to_string(),
                    found: format!("{token:?}"),
                })
            }
            Err(e) if !self.lenient => return Err(e),
            _ => {
                warn!(object = %id, offset = before_end, "missing endobj");
                self.lexer.set_position(before_end);
            }
        }

        Ok((id, object))
    }

    fn parse_optional_stream(&mut self, id: ObjectId, dict: Dictionary) -> ParseResult<Object> {
        let after_dict = self.lexer.position();
        match self.lexer.next_significant() {
            Ok(Token::Stream) => Ok(Object::Stream(self.parse_stream_body(id, dict)?)),
            _ => {
                self.lexer.set_position(after_dict);
                Ok(Object::Dictionary(dict))
            }
        }
    }

    fn expect_integer(&mut self, what: &str) -> ParseResult<i64> {
        match self.lexer.next_significant()? {
            Token::Integer(value) => Ok(value),
            token => Err(ParseError::UnexpectedToken {
                expected: what.to_string(),
                found: format!("{token:?}"),
            }),
        }
    }

    fn parse_from_token(&mut self, token: Token, depth: usize) -> ParseResult<Object> {
        match token {
            Token::Null => Ok(Object::Null),
            Token::Boolean(b) => Ok(Object::Boolean(b)),
            Token::Integer(i) => Ok(self.parse_integer_or_reference(i)),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::String(s) => Ok(Object::String(s, StringFormat::Literal)),
            Token::HexString(s) => Ok(Object::String(s, StringFormat::Hexadecimal)),
            Token::Name(n) => Ok(Object::Name(n)),
            Token::ArrayStart => self.parse_array(depth + 1),
            Token::DictStart => self.parse_dictionary(depth + 1).map(Object::Dictionary),
            Token::Eof => Err(ParseError::UnexpectedEof),
            _ => Err(ParseError::UnexpectedToken {
                expected: "PDF object".to_string(),
                found: format!("{token:?}"),
            }),
        }
    }

    /// `n g R` is recognized by looking two tokens ahead.
    fn parse_integer_or_reference(&mut self, number: i64) -> Object {
        let rewind = self.lexer.position();
        if let Ok(Token::Integer(generation)) = self.lexer.next_token() {
            if let Ok(Token::R) = self.lexer.next_token() {
                if let Some(id) = object_id(number, generation) {
                    return Object::Reference(id);
                }
            }
        }
        self.lexer.set_position(rewind);
        Object::Integer(number)
    }

    fn parse_array(&mut self, depth: usize) -> ParseResult<Object> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        let mut elements = Vec::new();
        loop {
            match self.lexer.next_significant()? {
                Token::ArrayEnd => break,
                Token::Eof => return Err(ParseError::UnexpectedEof),
                token => elements.push(self.parse_from_token(token, depth)?),
            }
        }
        Ok(Object::Array(elements))
    }

    fn parse_dictionary(&mut self, depth: usize) -> ParseResult<Dictionary> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        let mut dict = Dictionary::new();
        loop {
            match self.lexer.next_significant()? {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value = match self.lexer.next_significant()? {
                        Token::DictEnd if self.lenient => {
                            warn!(key = %key, "dictionary key without value");
                            dict.set(key, Object::Null);
                            break;
                        }
                        token => self.parse_from_token(token, depth)?,
                    };
                    dict.set(key, value);
                }
                token => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "dictionary key (name) or >>".to_string(),
                        found: format!("{token:?}"),
                    });
                }
            }
        }
        Ok(dict)
    }

    fn stream_length(&self, id: ObjectId, dict: &Dictionary) -> Option<usize> {
        let length = match dict.get("Length")? {
            Object::Integer(length) => Some(*length),
            Object::Reference(target) => {
                let resolved = self.length_resolver.and_then(|resolve| resolve(*target));
                if resolved.is_none() {
                    warn!(object = %id, length = %target, "indirect stream length unavailable");
                }
                resolved
            }
            _ => None,
        }?;
        usize::try_from(length).ok()
    }

    /// Reads the bytes between `stream` and `endstream`.
    ///
    /// `/Length` is trusted when it lands on `endstream`. Otherwise, in
    /// lenient mode, the data runs up to the next `endstream` keyword.
    fn parse_stream_body(&mut self, id: ObjectId, dict: Dictionary) -> ParseResult<Stream> {
        if let Err(e) = self.lexer.read_newline() {
            if !self.lenient {
                return Err(e);
            }
            self.lexer.skip_whitespace();
        }
        let data_start = self.lexer.position();
        let data = self.lexer.data();

        if let Some(length) = self.stream_length(id, &dict) {
            if let Some(end) = data_start.checked_add(length).filter(|end| *end <= data.len()) {
                let mut probe = Lexer::at(data, end);
                probe.skip_whitespace();
                if let Ok(Token::EndStream) = probe.next_token() {
                    let position = probe.position();
                    self.lexer.set_position(position);
                    return Ok(Stream::from_parts(dict, data[data_start..end].to_vec()));
                }
            }
            if !self.lenient {
                return Err(ParseError::syntax(
                    data_start,
                    format!("stream of {id} does not end after {length} bytes"),
                ));
            }
        } else if !self.lenient {
            return Err(ParseError::MissingKey("Length".to_string()));
        }

        let end = self
            .lexer
            .find_ahead(b"endstream")
            .ok_or(ParseError::UnexpectedEof)?;
        warn!(object = %id, offset = data_start, "stream length wrong, searched for endstream");

        let mut data_end = end;
        if data_end > data_start && data[data_end - 1] == b'\n' {
            data_end -= 1;
        }
        if data_end > data_start && data[data_end - 1] == b'\r' {
            data_end -= 1;
        }

        self.lexer.set_position(end + b"endstream".len());
        Ok(Stream::from_parts(dict, data[data_start..data_end].to_vec()))
    }
}

fn object_id(number: i64, generation: i64) -> Option<ObjectId> {
    let number = u32::try_from(number).ok()?;
    let generation = u16::try_from(generation).ok()?;
    Some(ObjectId::new(number, generation))
}
