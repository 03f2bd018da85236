use super::error::BencodeError;
use super::value::Value;
use bytes::Bytes;
use std::collections::BTreeMap;

const MAX_DEPTH: usize = 64;

/// Decodes exactly one bencode value, rejecting anything after it.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut decoder = Decoder::new(data);
    let value = decoder.value(0)?;

    if decoder.pos != data.len() {
        return Err(BencodeError::TrailingData {
            offset: decoder.pos,
        });
    }

    Ok(value)
}

/// Decodes a buffer holding a sequence of concatenated top-level values.
///
/// An empty buffer yields an empty sequence.
pub fn decode_all(data: &[u8]) -> Result<Vec<Value>, BencodeError> {
    let mut decoder = Decoder::new(data);
    let mut values = Vec::new();

    while decoder.pos < data.len() {
        values.push(decoder.value(0)?);
    }

    Ok(values)
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self, context: &'static str) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEof {
                offset: self.pos,
                context,
            })
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep {
                offset: self.pos,
                max: MAX_DEPTH,
            });
        }

        match self.peek("value")? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => self.bytes(),
            c => Err(BencodeError::UnexpectedChar {
                offset: self.pos,
                symbol: c as char,
            }),
        }
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        self.pos += 1;
        let start = self.pos;

        let negative = self.peek("integer")? == b'-';
        if negative {
            self.pos += 1;
        }

        let digits_start = self.pos;
        let mut magnitude: i64 = 0;
        while let Some(&c) = self.data.get(self.pos) {
            if !c.is_ascii_digit() {
                break;
            }
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|m| m.checked_add((c - b'0') as i64))
                .ok_or_else(|| BencodeError::InvalidInteger {
                    offset: start,
                    reason: "out of range".into(),
                })?;
            self.pos += 1;
        }

        if self.pos == digits_start {
            return Err(BencodeError::EmptyInteger { offset: start });
        }

        match self.peek("integer")? {
            b'e' => {
                self.pos += 1;
                Ok(Value::Integer(if negative { -magnitude } else { magnitude }))
            }
            c => Err(BencodeError::UnexpectedChar {
                offset: self.pos,
                symbol: c as char,
            }),
        }
    }

    fn bytes(&mut self) -> Result<Value, BencodeError> {
        let start = self.pos;
        let mut len: usize = 0;

        loop {
            match self.peek("string length")? {
                b':' => break,
                c @ b'0'..=b'9' => {
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add((c - b'0') as usize))
                        .ok_or(BencodeError::InvalidStringLength { offset: start })?;
                    self.pos += 1;
                }
                _ => return Err(BencodeError::InvalidStringLength { offset: self.pos }),
            }
        }
        self.pos += 1;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(BencodeError::UnexpectedEof {
                offset: self.data.len(),
                context: "byte string",
            })?;

        let bytes = Bytes::copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(Value::Bytes(bytes))
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.pos += 1;
        let mut list = Vec::new();

        while self.peek("list")? != b'e' {
            list.push(self.value(depth + 1)?);
        }

        self.pos += 1;
        Ok(Value::List(list))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.pos += 1;
        let mut dict = BTreeMap::new();

        loop {
            let key_offset = self.pos;
            match self.peek("dictionary")? {
                b'e' => break,
                b'0'..=b'9' => {}
                b'i' | b'l' | b'd' => {
                    return Err(BencodeError::NonStringKey { offset: key_offset })
                }
                c => {
                    return Err(BencodeError::UnexpectedChar {
                        offset: key_offset,
                        symbol: c as char,
                    })
                }
            }

            let key = match self.bytes()? {
                Value::Bytes(b) => b,
                _ => return Err(BencodeError::NonStringKey { offset: key_offset }),
            };

            if self.peek("dictionary")? == b'e' {
                return Err(BencodeError::MissingDictValue { offset: key_offset });
            }

            let value = self.value(depth + 1)?;
            dict.insert(key, value);
        }

        self.pos += 1;
        Ok(Value::Dict(dict))
    }
}
