// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Low-level PDF syntax: indirect object scanning and dictionary tokenising.
//
// Covers the subset `PdfPageWriter` emits (names, integers, reals, refs,
// arrays, nested dictionaries, length-delimited streams). Literal and hex
// strings are not produced by the writer and are rejected.

use std::collections::BTreeMap;

use voucherwerk_core::error::{Result, VoucherwerkError};

/// A parsed dictionary value.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Name(String),
    Integer(i64),
    Real(f64),
    Ref(u32, u16),
    Array(Vec<PdfValue>),
    Dict(PdfDict),
    /// `true`, `false`, `null`.
    Keyword(String),
}

/// Dictionary keyed by name (without the leading slash).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfDict(BTreeMap<String, PdfValue>);

impl PdfDict {
    pub fn get(&self, key: &str) -> Option<&PdfValue> {
        self.0.get(key)
    }

    pub fn name(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            PdfValue::Name(name) => Some(name),
            // Single-element filter arrays: `/Filter [/FlateDecode]`.
            PdfValue::Array(items) if items.len() == 1 => match &items[0] {
                PdfValue::Name(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            PdfValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn dict(&self, key: &str) -> Option<&PdfDict> {
        match self.get(key)? {
            PdfValue::Dict(d) => Some(d),
            PdfValue::Array(items) if items.len() == 1 => match &items[0] {
                PdfValue::Dict(d) => Some(d),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is(&self, key: &str, name: &str) -> bool {
        self.name(key) == Some(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One `N G obj ... endobj` found in the file.
#[derive(Debug)]
pub struct IndirectObject<'a> {
    pub number: u32,
    pub generation: u16,
    /// `None` when the object body is not a dictionary.
    pub dict: Option<PdfDict>,
    /// Exactly `/Length` bytes following the `stream` keyword.
    pub stream: Option<&'a [u8]>,
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\n' | b'\r' | b'\t' | b'\x0C' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'/' | b'<' | b'>' | b'[' | b']' | b'(' | b')' | b'{' | b'}' | b'%')
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    pos
}

/// Given `pos` just past an opening `<<`, return the index just past the
/// matching `>>`.
///
/// Depth starts at 1 and each `<<` / `>>` moves it by one, so nested
/// dictionaries such as `/DecodeParms << ... >>` stay inside the capture.
pub fn dict_end(data: &[u8], pos: usize) -> Result<usize> {
    let mut depth = 1usize;
    let mut i = pos;
    while i + 1 < data.len() {
        match &data[i..i + 2] {
            b"<<" => {
                depth += 1;
                i += 2;
            }
            b">>" => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => i += 1,
        }
    }
    Err(VoucherwerkError::PdfParse(format!(
        "unterminated dictionary starting at byte {pos}"
    )))
}

/// Recursive-descent tokeniser over a dictionary body.
struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&mut self) -> Option<u8> {
        self.pos = skip_whitespace(self.data, self.pos);
        self.data.get(self.pos).copied()
    }

    fn error(&self, what: &str) -> VoucherwerkError {
        VoucherwerkError::PdfParse(format!("{what} at dictionary offset {}", self.pos))
    }

    fn regular_token(&mut self) -> &'a str {
        let start = self.pos;
        while self.pos < self.data.len()
            && !is_whitespace(self.data[self.pos])
            && !is_delimiter(self.data[self.pos])
        {
            self.pos += 1;
        }
        // Regular characters are ASCII in the writer's output.
        std::str::from_utf8(&self.data[start..self.pos]).unwrap_or("")
    }

    /// Parse `key value` pairs until the closing `>>` (or end of input when
    /// `nested` is false).
    fn dict_body(&mut self, nested: bool) -> Result<PdfDict> {
        let mut map = BTreeMap::new();
        loop {
            match self.peek() {
                None if !nested => return Ok(PdfDict(map)),
                None => return Err(self.error("unterminated nested dictionary")),
                Some(b'>') if nested && self.data[self.pos..].starts_with(b">>") => {
                    self.pos += 2;
                    return Ok(PdfDict(map));
                }
                Some(b'/') => {
                    self.pos += 1;
                    let key = self.regular_token().to_owned();
                    let value = self.value()?;
                    map.insert(key, value);
                }
                Some(_) => return Err(self.error("expected a name key")),
            }
        }
    }

    fn value(&mut self) -> Result<PdfValue> {
        match self.peek() {
            None => Err(self.error("missing value")),
            Some(b'/') => {
                self.pos += 1;
                Ok(PdfValue::Name(self.regular_token().to_owned()))
            }
            Some(b'<') if self.data[self.pos..].starts_with(b"<<") => {
                self.pos += 2;
                Ok(PdfValue::Dict(self.dict_body(true)?))
            }
            Some(b'[') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some(b']') => {
                            self.pos += 1;
                            return Ok(PdfValue::Array(items));
                        }
                        None => return Err(self.error("unterminated array")),
                        Some(_) => items.push(self.value()?),
                    }
                }
            }
            Some(b'(') | Some(b'<') => Err(self.error("string values are not supported")),
            Some(b) if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.') => self.number(),
            Some(_) => {
                let word = self.regular_token();
                match word {
                    "true" | "false" | "null" => Ok(PdfValue::Keyword(word.to_owned())),
                    _ => Err(self.error("unexpected token")),
                }
            }
        }
    }

    /// Integer, real, or `N G R` reference.
    fn number(&mut self) -> Result<PdfValue> {
        let token = self.regular_token();
        if let Ok(n) = token.parse::<i64>() {
            if let Some(reference) = self.try_reference(n) {
                return Ok(reference);
            }
            return Ok(PdfValue::Integer(n));
        }
        token
            .parse::<f64>()
            .map(PdfValue::Real)
            .map_err(|_| self.error("malformed number"))
    }

    /// Rewinds when the tokens after `number` are not `G R`.
    fn try_reference(&mut self, number: i64) -> Option<PdfValue> {
        let saved = self.pos;
        let parsed = self.reference_tail(number);
        if parsed.is_none() {
            self.pos = saved;
        }
        parsed
    }

    fn reference_tail(&mut self, number: i64) -> Option<PdfValue> {
        let object = u32::try_from(number).ok()?;
        let p = skip_whitespace(self.data, self.pos);
        if !self.data.get(p)?.is_ascii_digit() {
            return None;
        }
        self.pos = p;
        let generation = self.regular_token().parse::<u16>().ok()?;
        let p = skip_whitespace(self.data, self.pos);
        if self.data.get(p) != Some(&b'R') {
            return None;
        }
        let after = self.data.get(p + 1).copied();
        if after.is_some_and(|b| !is_whitespace(b) && !is_delimiter(b)) {
            return None;
        }
        self.pos = p + 1;
        Some(PdfValue::Ref(object, generation))
    }
}

/// Parse the body of a dictionary (the bytes between `<<` and `>>`).
pub fn parse_dict(body: &[u8]) -> Result<PdfDict> {
    Tokenizer::new(body).dict_body(false)
}

/// Read `N G` immediately before `obj_pos` (the index of ` obj`).
fn object_header(data: &[u8], obj_pos: usize) -> Option<(u32, u16)> {
    let gen_end = obj_pos;
    let mut i = gen_end;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    let gen_start = i;
    if gen_start == gen_end || i == 0 || data[i - 1] != b' ' {
        return None;
    }
    let num_end = i - 1;
    let mut i = num_end;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == num_end || (i > 0 && !is_whitespace(data[i - 1])) {
        return None;
    }
    let number = std::str::from_utf8(&data[i..num_end]).ok()?.parse().ok()?;
    let generation = std::str::from_utf8(&data[gen_start..gen_end])
        .ok()?
        .parse()
        .ok()?;
    Some((number, generation))
}

/// Forward-only scanner over the indirect objects of a PDF.
///
/// Stream payloads are skipped by their declared `/Length`, so binary image
/// data that happens to contain `obj` or `endstream` is never mistaken for
/// structure.
pub struct ObjectScanner<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ObjectScanner<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Next indirect object, `Ok(None)` at end of input.
    pub fn next_object(&mut self) -> Result<Option<IndirectObject<'a>>> {
        let data = self.data;
        while let Some(at) = find(data, b" obj", self.pos) {
            let after = at + 4;
            self.pos = after;
            if data.get(after).is_some_and(|&b| !is_whitespace(b) && b != b'<') {
                continue;
            }
            let Some((number, generation)) = object_header(data, at) else {
                continue;
            };

            let body = skip_whitespace(data, after);
            if !data[body..].starts_with(b"<<") {
                return Ok(Some(IndirectObject {
                    number,
                    generation,
                    dict: None,
                    stream: None,
                }));
            }

            let end = dict_end(data, body + 2)?;
            let dict = parse_dict(&data[body + 2..end - 2])?;
            self.pos = end;

            let stream = self.stream_after(end, &dict, number)?;
            return Ok(Some(IndirectObject {
                number,
                generation,
                dict: Some(dict),
                stream,
            }));
        }
        self.pos = data.len();
        Ok(None)
    }

    fn stream_after(
        &mut self,
        dict_end: usize,
        dict: &PdfDict,
        number: u32,
    ) -> Result<Option<&'a [u8]>> {
        let data = self.data;
        let keyword = skip_whitespace(data, dict_end);
        if !data[keyword..].starts_with(b"stream") {
            return Ok(None);
        }
        let mut start = keyword + b"stream".len();
        if data[start..].starts_with(b"\r\n") {
            start += 2;
        } else if data[start..].starts_with(b"\n") || data[start..].starts_with(b"\r") {
            start += 1;
        }

        let length = dict.integer("Length").ok_or_else(|| {
            VoucherwerkError::PdfParse(format!("object {number} has no direct /Length"))
        })?;
        let length = usize::try_from(length).map_err(|_| {
            VoucherwerkError::PdfParse(format!("object {number} has negative /Length"))
        })?;
        let payload = data.get(start..start + length).ok_or_else(|| {
            VoucherwerkError::PdfParse(format!(
                "object {number} stream of {length} bytes overruns the file"
            ))
        })?;
        self.pos = start + length;
        Ok(Some(payload))
    }
}
