//! CSS Tokenizer
//!
//! Tokenizes CSS input according to CSS Syntax Module Level 3. Tokenizing
//! never fails: malformed strings and urls become `BadString`/`BadUrl`, and
//! every token carries the byte span it was read from so the original text
//! can be echoed back unchanged.

use std::ops::Range;

/// CSS Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier (e.g., property names, keywords); escapes are kept as written
    Ident(String),
    /// Function token (identifier followed by '(')
    Function(String),
    /// At-keyword (e.g., @media, @import)
    AtKeyword(String),
    /// Hash token (e.g., #id, #fff)
    Hash(String, HashType),
    /// String token (unescaped value)
    String(String),
    /// String interrupted by a newline or end of input
    BadString,
    /// Unquoted url(...)
    Url(String),
    /// Unquoted url(...) containing an invalid character
    BadUrl,
    /// Number (without unit)
    Number(f32),
    /// Percentage
    Percentage(f32),
    /// Dimension (number with unit)
    Dimension(f32, String),
    /// Whitespace, including any comments it swallowed
    Whitespace,
    /// `<!--`
    Cdo,
    /// `-->`
    Cdc,
    /// Colon ':'
    Colon,
    /// Semicolon ';'
    Semicolon,
    /// Comma ','
    Comma,
    /// Left bracket '['
    LeftBracket,
    /// Right bracket ']'
    RightBracket,
    /// Left paren '('
    LeftParen,
    /// Right paren ')'
    RightParen,
    /// Left brace '{'
    LeftBrace,
    /// Right brace '}'
    RightBrace,
    /// Delim (any other single character)
    Delim(char),
    /// End of file
    Eof,
}

impl Token {
    /// Does this token open a `(`, `[` or `{` block?
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            Token::Function(_) | Token::LeftParen | Token::LeftBracket | Token::LeftBrace
        )
    }

    /// Does this token close a `)`, `]` or `}` block?
    pub fn closes_block(&self) -> bool {
        matches!(self, Token::RightParen | Token::RightBracket | Token::RightBrace)
    }
}

/// Hash token type (id or unrestricted)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// Could be an ID selector
    Id,
    /// Unrestricted (e.g., color)
    Unrestricted,
}

/// A token together with the byte range it covers in the input
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<usize>,
}

impl SpannedToken {
    /// The exact source text of this token
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.span.clone()]
    }
}

/// CSS Tokenizer
pub struct Tokenizer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    /// Peek at the next character without consuming
    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Peek at the second character without consuming
    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn peek_third(&self) -> Option<char> {
        self.rest().chars().nth(2)
    }

    /// Consume the next character
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    /// Consume whitespace
    fn consume_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Consume a comment; an unterminated comment runs to the end of input
    fn consume_comment(&mut self) {
        self.advance(); // consume '/'
        self.advance(); // consume '*'

        loop {
            match self.advance() {
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    return;
                }
                Some(_) => continue,
                None => return,
            }
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.next_spanned().token
    }

    /// Get the next token together with its source span
    pub fn next_spanned(&mut self) -> SpannedToken {
        // Comments fold into the surrounding whitespace token; a comment with
        // no whitespace around it simply vanishes.
        let start = self.position;
        let mut saw_whitespace = false;
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    saw_whitespace = true;
                    self.consume_whitespace();
                }
                Some('/') if self.peek_second() == Some('*') => self.consume_comment(),
                _ => break,
            }
        }

        if saw_whitespace {
            return SpannedToken {
                token: Token::Whitespace,
                span: start..self.position,
            };
        }

        let token_start = self.position;
        let token = self.consume_token();
        SpannedToken {
            token,
            span: token_start..self.position,
        }
    }

    fn consume_token(&mut self) -> Token {
        let c = match self.peek() {
            Some(c) => c,
            None => return Token::Eof,
        };

        match c {
            ':' => self.single(Token::Colon),
            ';' => self.single(Token::Semicolon),
            ',' => self.single(Token::Comma),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '{' => self.single(Token::LeftBrace),
            '}' => self.single(Token::RightBrace),
            '"' | '\'' => self.consume_string(),
            '#' => {
                let second = self.peek_second();
                if second.map(is_ident_char).unwrap_or(false) || self.is_valid_escape_at(1) {
                    self.consume_hash()
                } else {
                    self.single(Token::Delim('#'))
                }
            }
            '@' => {
                self.advance();
                if self.starts_identifier() {
                    Token::AtKeyword(self.consume_ident_name())
                } else {
                    Token::Delim('@')
                }
            }
            '<' if self.rest().starts_with("<!--") => {
                for _ in 0..4 {
                    self.advance();
                }
                Token::Cdo
            }
            '.' if self.peek_second().map(|c| c.is_ascii_digit()).unwrap_or(false) => {
                self.consume_number()
            }
            '0'..='9' => self.consume_number(),
            '+' | '-' => {
                if self.starts_number() {
                    self.consume_number()
                } else if c == '-' && self.rest().starts_with("-->") {
                    for _ in 0..3 {
                        self.advance();
                    }
                    Token::Cdc
                } else if c == '-' && self.starts_identifier() {
                    self.consume_ident_like()
                } else {
                    self.single(Token::Delim(c))
                }
            }
            '\\' if self.is_valid_escape_at(0) => self.consume_ident_like(),
            _ if is_ident_start(c) => self.consume_ident_like(),
            _ => self.single(Token::Delim(c)),
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    /// Is there a valid escape (backslash not followed by newline) at `offset`?
    fn is_valid_escape_at(&self, offset: usize) -> bool {
        let mut chars = self.rest().chars().skip(offset);
        matches!((chars.next(), chars.next()), (Some('\\'), Some(c)) if c != '\n')
    }

    /// Check if input starts an identifier
    fn starts_identifier(&self) -> bool {
        let mut chars = self.rest().chars();
        match chars.next() {
            Some('-') => match chars.next() {
                Some(c) if is_ident_start(c) => true,
                Some('-') => true,
                Some('\\') => self.is_valid_escape_at(1),
                _ => false,
            },
            Some('\\') => self.is_valid_escape_at(0),
            Some(c) if is_ident_start(c) => true,
            _ => false,
        }
    }

    /// Check if input starts a signed number
    fn starts_number(&self) -> bool {
        match self.peek_second() {
            Some(c) if c.is_ascii_digit() => true,
            Some('.') => self.peek_third().map(|c| c.is_ascii_digit()).unwrap_or(false),
            _ => false,
        }
    }

    /// Consume a string token
    fn consume_string(&mut self) -> Token {
        let quote = match self.advance() {
            Some(q) => q,
            None => return Token::Eof,
        };
        let mut value = String::new();

        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    self.advance();
                    return Token::String(value);
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('\n') | None => {}
                        Some(c) => value.push(c),
                    }
                }
                // The newline itself is not part of the bad string
                Some('\n') | None => return Token::BadString,
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }
    }

    /// Consume a hash token
    fn consume_hash(&mut self) -> Token {
        self.advance(); // consume '#'
        let hash_type = if self.starts_identifier() {
            HashType::Id
        } else {
            HashType::Unrestricted
        };
        Token::Hash(self.consume_ident_name(), hash_type)
    }

    /// Consume an identifier name, keeping escape sequences as written
    fn consume_ident_name(&mut self) -> String {
        let mut name = String::new();
        loop {
            match self.peek() {
                Some(c) if is_ident_char(c) => {
                    name.push(c);
                    self.advance();
                }
                Some('\\') if self.is_valid_escape_at(0) => {
                    name.push('\\');
                    self.advance();
                    self.consume_escape_into(&mut name);
                }
                _ => break,
            }
        }
        name
    }

    /// Consume the body of an escape (after the backslash)
    fn consume_escape_into(&mut self, out: &mut String) {
        match self.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                let mut digits = 0;
                while let Some(c) = self.peek() {
                    if digits < 6 && c.is_ascii_hexdigit() {
                        out.push(c);
                        self.advance();
                        digits += 1;
                    } else {
                        break;
                    }
                }
                if let Some(c) = self.peek() {
                    if c.is_ascii_whitespace() {
                        out.push(c);
                        self.advance();
                    }
                }
            }
            Some(c) => {
                out.push(c);
                self.advance();
            }
            None => {}
        }
    }

    /// Consume an identifier-like token (ident, function, or url)
    fn consume_ident_like(&mut self) -> Token {
        let name = self.consume_ident_name();

        if self.peek() != Some('(') {
            return Token::Ident(name);
        }
        self.advance(); // consume '('

        if name.eq_ignore_ascii_case("url") {
            let mut lookahead = self.rest().chars().skip_while(|c| c.is_ascii_whitespace());
            match lookahead.next() {
                // Quoted URL - return as function, the string follows
                Some('"') | Some('\'') => {}
                _ => return self.consume_url(),
            }
        }

        Token::Function(name)
    }

    /// Consume a bare URL
    fn consume_url(&mut self) -> Token {
        let mut url = String::new();
        self.consume_whitespace();

        loop {
            match self.peek() {
                Some(')') => {
                    self.advance();
                    return Token::Url(url);
                }
                None => return Token::Url(url),
                Some(c) if c.is_ascii_whitespace() => {
                    self.consume_whitespace();
                    match self.peek() {
                        Some(')') => {
                            self.advance();
                            return Token::Url(url);
                        }
                        None => return Token::Url(url),
                        _ => return self.consume_bad_url_remnants(),
                    }
                }
                Some('"') | Some('\'') | Some('(') => return self.consume_bad_url_remnants(),
                Some('\\') => {
                    self.advance();
                    if let Some(c) = self.advance() {
                        url.push(c);
                    }
                }
                Some(c) => {
                    url.push(c);
                    self.advance();
                }
            }
        }
    }

    fn consume_bad_url_remnants(&mut self) -> Token {
        loop {
            match self.advance() {
                Some(')') | None => return Token::BadUrl,
                Some('\\') => {
                    self.advance();
                }
                Some(_) => {}
            }
        }
    }

    /// Consume a number token
    fn consume_number(&mut self) -> Token {
        let start = self.position;

        if matches!(self.peek(), Some('+') | Some('-')) {
            self.advance();
        }
        self.consume_digits();

        if self.peek() == Some('.') && self.peek_second().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
            self.consume_digits();
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let exponent = match self.peek_second() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+') | Some('-') => self.peek_third().map(|c| c.is_ascii_digit()).unwrap_or(false),
                _ => false,
            };
            if exponent {
                self.advance();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
                self.consume_digits();
            }
        }

        let value: f32 = self.input[start..self.position].parse().unwrap_or(0.0);

        if self.peek() == Some('%') {
            self.advance();
            return Token::Percentage(value);
        }

        if self.starts_identifier() {
            let unit = self.consume_ident_name();
            return Token::Dimension(value, unit);
        }

        Token::Number(value)
    }

    fn consume_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Tokenize all remaining input
    pub fn tokenize_all(&mut self) -> Vec<SpannedToken> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_spanned();
            if spanned.token == Token::Eof {
                break;
            }
            tokens.push(spanned);
        }
        tokens
    }
}

/// Check if character can start an identifier
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c > '\x7F'
}

/// Check if character can be part of an identifier
fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c == '-' || c.is_ascii_digit()
}
