//! Structural reader for Terraform configuration files.
//!
//! This is not a full HCL implementation. It recognises blocks, attributes,
//! comments, quoted strings (with template interpolations) and heredocs well
//! enough to find block boundaries and to capture every attribute value as
//! verbatim source text. Literal strings, booleans, numbers and object
//! constructors are additionally decoded so callers can inspect them.
//! Unbalanced delimiters, unterminated strings and stray tokens are errors.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// An attribute value.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Exact source text, without surrounding whitespace.
    pub source: String,
    pub value: Value,
}

/// Decoded form of an expression, where one is available.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A quoted string without interpolation, unescaped.
    String(String),
    Bool(bool),
    Number(String),
    /// An object constructor `{ key = value, ... }`, in source order.
    Object(Vec<(String, Expr)>),
    /// Anything else: references, function calls, templates, lists.
    Other,
}

impl Expr {
    /// Build an expression from source text.
    pub fn from_source(source: impl Into<String>) -> Self {
        let source = source.into();
        let value = interpret(&source);
        Self { source, value }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, Expr)]> {
        match &self.value {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub expr: Expr,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub line: usize,
}

impl Block {
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Attribute(Attribute),
    Block(Block),
}

/// Contents of a file or of a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub items: Vec<Item>,
}

impl Body {
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter().filter_map(|item| match item {
            Item::Attribute(attr) => Some(attr),
            Item::Block(_) => None,
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|item| match item {
            Item::Block(block) => Some(block),
            Item::Attribute(_) => None,
        })
    }

    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks().filter(move |block| block.kind == kind)
    }

    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes().find(|attr| attr.key == key)
    }

    /// Decoded string value of an attribute.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attribute(key).and_then(|attr| attr.expr.as_str())
    }
}

/// Parse one configuration file's contents.
pub fn parse(path: impl AsRef<Path>, source: &str) -> CoreResult<Body> {
    let mut parser = Parser::new(path.as_ref(), source);
    parser.parse_body(false)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Context {
    /// Attribute inside a body: ends at a newline or the closing brace.
    Body,
    /// Entry inside an object constructor: also ends at a comma.
    Object,
}

struct Parser<'a> {
    path: PathBuf,
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(path: &Path, src: &'a str) -> Self {
        Self {
            path: path.to_path_buf(),
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> CoreError {
        CoreError::parse(&self.path, self.line, message)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
        }
        Some(byte)
    }

    fn at_comment(&self) -> bool {
        matches!(
            (self.peek(), self.peek_at(1)),
            (Some(b'#'), _) | (Some(b'/'), Some(b'/')) | (Some(b'/'), Some(b'*'))
        )
    }

    fn skip_comment(&mut self) -> CoreResult<()> {
        if self.peek() == Some(b'/') && self.peek_at(1) == Some(b'*') {
            self.pos += 2;
            loop {
                match self.peek() {
                    None => return Err(self.error("unterminated block comment")),
                    Some(b'*') if self.peek_at(1) == Some(b'/') => {
                        self.pos += 2;
                        return Ok(());
                    }
                    _ => {
                        self.bump();
                    }
                }
            }
        }
        while let Some(byte) = self.peek() {
            if byte == b'\n' {
                break;
            }
            self.pos += 1;
        }
        Ok(())
    }

    /// Skip spaces and comments on the current line.
    fn skip_inline(&mut self) -> CoreResult<()> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => self.pos += 1,
                Some(b'/') if self.peek_at(1) == Some(b'*') => self.skip_comment()?,
                _ => return Ok(()),
            }
        }
    }

    /// Skip whitespace, newlines and comments.
    fn skip_trivia(&mut self) -> CoreResult<()> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.bump();
                }
                _ if self.at_comment() => self.skip_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn read_identifier(&mut self) -> Option<String> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if is_ident_byte(byte) {
                self.pos += 1;
            } else {
                break;
            }
        }
        (self.pos > start).then(|| self.src[start..self.pos].to_string())
    }

    fn parse_body(&mut self, nested: bool) -> CoreResult<Body> {
        let mut body = Body::default();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None if nested => return Err(self.error("unclosed block, expected '}'")),
                None => return Ok(body),
                Some(b'}') if nested => {
                    self.bump();
                    return Ok(body);
                }
                Some(b'}') => return Err(self.error("unexpected '}'")),
                _ => {}
            }

            let line = self.line;
            let key = self.read_identifier().ok_or_else(|| {
                self.error(format!("unexpected character {:?}", self.current_char()))
            })?;
            self.skip_inline()?;

            match self.peek() {
                Some(b'=') if self.peek_at(1) != Some(b'=') => {
                    self.bump();
                    self.skip_inline()?;
                    let expr = self.scan_expr(Context::Body)?;
                    self.skip_inline()?;
                    if self.at_comment() {
                        self.skip_comment()?;
                    }
                    match self.peek() {
                        None | Some(b'\n' | b'}') => {}
                        Some(_) => {
                            return Err(self.error(format!(
                                "unexpected {:?} after attribute {key}",
                                self.current_char()
                            )))
                        }
                    }
                    body.items.push(Item::Attribute(Attribute { key, expr, line }));
                }
                Some(byte) if byte == b'"' || byte == b'{' || is_ident_byte(byte) => {
                    let mut labels = Vec::new();
                    loop {
                        match self.peek() {
                            Some(b'"') => labels.push(self.read_label_string()?),
                            Some(b'{') => break,
                            Some(byte) if is_ident_byte(byte) => {
                                if let Some(label) = self.read_identifier() {
                                    labels.push(label);
                                }
                            }
                            _ => {
                                return Err(
                                    self.error(format!("expected '{{' to open block {key}"))
                                )
                            }
                        }
                        self.skip_inline()?;
                    }
                    self.bump();
                    let inner = self.parse_body(true)?;
                    body.items.push(Item::Block(Block {
                        kind: key,
                        labels,
                        body: inner,
                        line,
                    }));
                }
                _ => return Err(self.error(format!("expected '=' or block after {key}"))),
            }
        }
    }

    fn current_char(&self) -> char {
        self.src[self.pos..].chars().next().unwrap_or('\0')
    }

    fn read_label_string(&mut self) -> CoreResult<String> {
        let start = self.pos;
        self.skip_quoted()?;
        Ok(unescape(&self.src[start + 1..self.pos - 1]))
    }

    /// Consume one expression and return it with its source text.
    fn scan_expr(&mut self, ctx: Context) -> CoreResult<Expr> {
        let start = self.pos;
        let mut closers: Vec<u8> = Vec::new();

        loop {
            let Some(byte) = self.peek() else {
                if let Some(closer) = closers.last() {
                    return Err(self.error(format!("missing '{}'", *closer as char)));
                }
                break;
            };
            let top = closers.is_empty();
            match byte {
                b'\n' if top => break,
                b'}' if top => break,
                b',' if top && ctx == Context::Object => break,
                b'"' => self.skip_quoted()?,
                b'<' if self.peek_at(1) == Some(b'<') && self.heredoc_follows() => {
                    self.skip_heredoc()?
                }
                b'#' | b'/' if self.at_comment() => {
                    if top && !(byte == b'/' && self.peek_at(1) == Some(b'*')) {
                        break;
                    }
                    self.skip_comment()?;
                }
                b'(' | b'[' | b'{' => {
                    closers.push(closing_for(byte));
                    self.bump();
                }
                b')' | b']' | b'}' => match closers.pop() {
                    Some(expected) if expected == byte => {
                        self.bump();
                    }
                    Some(expected) => {
                        return Err(self.error(format!(
                            "expected '{}' but found '{}'",
                            expected as char, byte as char
                        )))
                    }
                    None => return Err(self.error(format!("unexpected '{}'", byte as char))),
                },
                _ => {
                    self.bump();
                }
            }
        }

        let source = self.src[start..self.pos].trim_end();
        if source.is_empty() {
            return Err(self.error("expected an expression"));
        }
        Ok(Expr::from_source(source))
    }

    /// Consume a quoted string, including nested template sequences.
    fn skip_quoted(&mut self) -> CoreResult<()> {
        self.bump();
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(self.error("unterminated string")),
                Some(b'\\') => {
                    self.pos += 2;
                }
                Some(b'"') => {
                    self.bump();
                    return Ok(());
                }
                Some(b'$' | b'%') if self.peek_at(1) == Some(b'{') => {
                    self.pos += 2;
                    self.skip_template_sequence()?;
                }
                Some(b'$' | b'%')
                    if self.peek_at(1) == self.peek() && self.peek_at(2) == Some(b'{') =>
                {
                    self.pos += 3;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Consume the body of `${ ... }` up to its matching brace.
    fn skip_template_sequence(&mut self) -> CoreResult<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return Err(self.error("unterminated template sequence")),
                Some(b'"') => self.skip_quoted()?,
                Some(b'{') => {
                    depth += 1;
                    self.bump();
                }
                Some(b'}') => {
                    depth -= 1;
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        Ok(())
    }

    fn heredoc_follows(&self) -> bool {
        let mut offset = 2;
        if self.peek_at(offset) == Some(b'-') {
            offset += 1;
        }
        self.peek_at(offset)
            .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
    }

    fn skip_heredoc(&mut self) -> CoreResult<()> {
        self.pos += 2;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let marker = self
            .read_identifier()
            .ok_or_else(|| self.error("heredoc without marker"))?;
        while let Some(byte) = self.peek() {
            if byte == b'\n' {
                break;
            }
            self.pos += 1;
        }
        loop {
            if self.bump().is_none() {
                return Err(self.error(format!("unterminated heredoc {marker}")));
            }
            let line_end = self.src[self.pos..]
                .find('\n')
                .map_or(self.src.len(), |i| self.pos + i);
            if self.src[self.pos..line_end].trim() == marker {
                self.pos = line_end;
                return Ok(());
            }
            self.pos = line_end;
            if self.pos >= self.bytes.len() {
                return Err(self.error(format!("unterminated heredoc {marker}")));
            }
        }
    }
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || byte >= 0x80
}

fn closing_for(opener: u8) -> u8 {
    match opener {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

fn interpret(source: &str) -> Value {
    match source {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Some(inner) = plain_string_literal(source) {
        return Value::String(unescape(inner));
    }
    let numeric_start = source.starts_with(|c: char| c.is_ascii_digit() || c == '-');
    if numeric_start && source.parse::<f64>().is_ok() {
        return Value::Number(source.to_string());
    }
    if source.starts_with('{') && source.ends_with('}') {
        if let Some(entries) = parse_object(&source[1..source.len() - 1]) {
            return Value::Object(entries);
        }
    }
    Value::Other
}

/// Inner text of `"..."` when it is a single literal with no template.
fn plain_string_literal(source: &str) -> Option<&str> {
    let inner = source.strip_prefix('"')?.strip_suffix('"')?;
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return None,
            b'$' | b'%'
                if bytes.get(i + 1) == Some(&bytes[i]) && bytes.get(i + 2) == Some(&b'{') =>
            {
                i += 3
            }
            b'$' | b'%' if bytes.get(i + 1) == Some(&b'{') => return None,
            _ => i += 1,
        }
    }
    Some(inner)
}

fn unescape(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                match chars.get(i + 1) {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('u') => {
                        let hex: String = chars.iter().skip(i + 2).take(4).collect();
                        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                            Some(decoded) => {
                                out.push(decoded);
                                i += 4;
                            }
                            None => out.push_str("\\u"),
                        }
                    }
                    Some(other) => {
                        out.push('\\');
                        out.push(*other);
                    }
                    None => out.push('\\'),
                }
                i += 2;
            }
            // `$${` and `%%{` are escaped template openers.
            '$' | '%' if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&'{') => {
                out.push(c);
                out.push('{');
                i += 3;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Parse the inside of an object constructor. `None` when the entries are
/// not simple `key = value` pairs.
fn parse_object(inner: &str) -> Option<Vec<(String, Expr)>> {
    let mut parser = Parser::new(Path::new("<object>"), inner);
    let mut entries = Vec::new();
    loop {
        loop {
            parser.skip_trivia().ok()?;
            if parser.peek() == Some(b',') {
                parser.bump();
            } else {
                break;
            }
        }
        let Some(byte) = parser.peek() else {
            return Some(entries);
        };
        let key = match byte {
            b'"' => parser.read_label_string().ok()?,
            _ => parser.read_identifier()?,
        };
        parser.skip_inline().ok()?;
        match parser.bump() {
            Some(b'=' | b':') => {}
            _ => return None,
        }
        parser.skip_inline().ok()?;
        let expr = parser.scan_expr(Context::Object).ok()?;
        if parser.peek() == Some(b'}') {
            return None;
        }
        entries.push((key, expr));
    }
}
