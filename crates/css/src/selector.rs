//! CSS Selector Parser
//!
//! Parses a single complex selector (Selectors Level 4 syntax, no nesting)
//! well enough to tell whether it is valid and which of its parts are
//! pseudo-classes or pseudo-elements. Matching against a document is never
//! needed: critical-ness is decided by comparing selector text.

use crate::error::{CssError, CssResult, SourceLocation};
use crate::tokenizer::{HashType, SpannedToken, Token, Tokenizer};

/// A complete selector (may contain multiple compound selectors)
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    /// The selector text exactly as it was parsed
    pub text: String,
    /// The compound selectors and combinators that make up this selector
    pub parts: Vec<SelectorPart>,
    /// Byte offset in `text` where a trailing pseudo-element begins
    pseudo_element_at: Option<usize>,
}

/// A part of a compound selector
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorPart {
    /// Universal selector (*)
    Universal,
    /// Type selector (e.g., div, p, span)
    Type(String),
    /// Class selector (e.g., .container)
    Class(String),
    /// ID selector (e.g., #main)
    Id(String),
    /// Attribute selector (e.g., [type="text"])
    Attribute {
        name: String,
        op: Option<AttributeOp>,
        value: Option<String>,
        case_insensitive: bool,
    },
    /// Pseudo-class (e.g., :hover, :nth-child(2n))
    PseudoClass {
        name: String,
        args: Option<String>,
    },
    /// Pseudo-element (e.g., ::before, ::after)
    PseudoElement {
        name: String,
        args: Option<String>,
    },
    /// Combinator between compound selectors
    Combinator(Combinator),
}

impl SelectorPart {
    fn is_pseudo(&self) -> bool {
        matches!(self, SelectorPart::PseudoClass { .. } | SelectorPart::PseudoElement { .. })
    }
}

/// Attribute selector operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeOp {
    /// [attr=value] - exact match
    Equals,
    /// [attr~=value] - contains word
    Includes,
    /// [attr|=value] - starts with value or value-
    DashMatch,
    /// [attr^=value] - starts with
    PrefixMatch,
    /// [attr$=value] - ends with
    SuffixMatch,
    /// [attr*=value] - contains
    SubstringMatch,
}

/// Selector combinators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Descendant combinator (space)
    Descendant,
    /// Child combinator (>)
    Child,
    /// Next sibling combinator (+)
    NextSibling,
    /// Subsequent sibling combinator (~)
    SubsequentSibling,
}

impl Selector {
    /// Parse a selector string; the whole input must be one selector
    pub fn parse(input: &str) -> CssResult<Self> {
        let mut parser = SelectorParser::new(input);
        let selector = parser.parse_selector()?;
        parser.skip_whitespace();
        if !matches!(parser.peek(), Token::Eof) {
            return Err(parser.invalid(input));
        }
        Ok(selector)
    }

    /// Parse a comma-separated list of selectors
    pub fn parse_list(input: &str) -> CssResult<Vec<Self>> {
        let mut parser = SelectorParser::new(input);
        parser.parse_selector_list()
    }

    /// A selector made only of pseudo-classes/pseudo-elements (optionally
    /// on `*`), e.g. `:hover` or `*::selection`
    pub fn is_pseudo_only(&self) -> bool {
        self.parts.iter().any(SelectorPart::is_pseudo)
            && self
                .parts
                .iter()
                .all(|part| part.is_pseudo() || matches!(part, SelectorPart::Universal))
    }

    /// The trailing pseudo-element, if the selector ends with one
    pub fn pseudo_element(&self) -> Option<&SelectorPart> {
        self.pseudo_element_at?;
        self.parts.last()
    }

    /// Selector text with its trailing pseudo-element removed
    ///
    /// `*::first-letter` gives `*`, `a:hover::before` gives `a:hover`.
    /// Returns `None` when there is no trailing pseudo-element or nothing
    /// precedes it.
    pub fn base_text(&self) -> Option<&str> {
        let at = self.pseudo_element_at?;
        let base = self.text[..at].trim_end();
        if base.is_empty() {
            None
        } else {
            Some(base)
        }
    }
}

/// Selector parser
struct SelectorParser<'a> {
    input: &'a str,
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl<'a> SelectorParser<'a> {
    fn new(input: &'a str) -> Self {
        let tokens = Tokenizer::new(input).tokenize_all();
        Self { input, tokens, pos: 0 }
    }

    fn location(&self) -> SourceLocation {
        let offset = self.offset();
        let consumed = &self.input[..offset];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0) + 1;
        SourceLocation::new(line, column, offset)
    }

    /// Byte offset of the current token
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or(self.input.len())
    }

    fn invalid(&self, selector: &str) -> CssError {
        CssError::invalid_selector(selector, self.location())
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn skip_whitespace(&mut self) {
        while let Token::Whitespace = self.peek() {
            self.advance();
        }
    }

    fn parse_selector_list(&mut self) -> CssResult<Vec<Selector>> {
        let mut selectors = Vec::new();

        loop {
            self.skip_whitespace();

            if matches!(self.peek(), Token::Eof) {
                break;
            }

            selectors.push(self.parse_selector()?);

            self.skip_whitespace();

            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::Eof => break,
                _ => return Err(self.invalid(self.input)),
            }
        }

        Ok(selectors)
    }

    fn parse_selector(&mut self) -> CssResult<Selector> {
        self.skip_whitespace();
        let start = self.offset();
        let mut parts = Vec::new();
        let mut saw_simple_selector = false;
        let mut pseudo_element_at = None;

        loop {
            // Track if there's whitespace before the next token
            let had_whitespace = matches!(self.peek(), Token::Whitespace);
            self.skip_whitespace();

            match self.peek() {
                Token::Eof | Token::Comma | Token::LeftBrace => break,
                _ => {}
            }

            // Check for explicit combinator (>, +, ~)
            if let Some(comb) = self.try_parse_combinator() {
                if !saw_simple_selector {
                    return Err(self.invalid(&self.input[start..]));
                }
                parts.push(SelectorPart::Combinator(comb));
                saw_simple_selector = false;
                continue;
            } else if saw_simple_selector && had_whitespace {
                // Whitespace between compound selectors = descendant combinator
                parts.push(SelectorPart::Combinator(Combinator::Descendant));
                saw_simple_selector = false;
            }

            let part_start = self.offset();
            match self.try_parse_simple_selector()? {
                Some(part) => {
                    pseudo_element_at = match part {
                        SelectorPart::PseudoElement { .. } => Some(part_start - start),
                        _ => None,
                    };
                    parts.push(part);
                    saw_simple_selector = true;
                }
                None => return Err(self.invalid(&self.input[start..])),
            }
        }

        // Empty selector or dangling combinator
        if parts.is_empty() || !saw_simple_selector {
            return Err(self.invalid(&self.input[start..]));
        }

        let end = self.offset();
        Ok(Selector {
            text: self.input[start..end].trim_end().to_string(),
            parts,
            pseudo_element_at,
        })
    }

    fn try_parse_combinator(&mut self) -> Option<Combinator> {
        let combinator = match self.peek() {
            Token::Delim('>') => Combinator::Child,
            Token::Delim('+') => Combinator::NextSibling,
            Token::Delim('~') => Combinator::SubsequentSibling,
            _ => return None,
        };
        self.advance();
        Some(combinator)
    }

    fn try_parse_simple_selector(&mut self) -> CssResult<Option<SelectorPart>> {
        match self.peek().clone() {
            Token::Delim('*') => {
                self.advance();
                Ok(Some(SelectorPart::Universal))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Some(SelectorPart::Type(name.to_ascii_lowercase())))
            }
            Token::Hash(name, HashType::Id) => {
                self.advance();
                Ok(Some(SelectorPart::Id(name)))
            }
            Token::Delim('.') => {
                self.advance();
                match self.advance() {
                    Token::Ident(name) => Ok(Some(SelectorPart::Class(name))),
                    _ => Err(self.invalid(".")),
                }
            }
            Token::LeftBracket => self.parse_attribute_selector().map(Some),
            Token::Colon => self.parse_pseudo_selector().map(Some),
            _ => Ok(None),
        }
    }

    fn parse_attribute_selector(&mut self) -> CssResult<SelectorPart> {
        self.advance(); // consume '['
        self.skip_whitespace();

        // Get attribute name
        let name = match self.advance() {
            Token::Ident(name) => name,
            _ => return Err(self.invalid("[")),
        };

        self.skip_whitespace();

        // Check for operator
        let op = match self.peek() {
            Token::Delim('=') => {
                self.advance();
                Some(AttributeOp::Equals)
            }
            &Token::Delim(c @ ('~' | '|' | '^' | '$' | '*')) => {
                let op = match c {
                    '~' => AttributeOp::Includes,
                    '|' => AttributeOp::DashMatch,
                    '^' => AttributeOp::PrefixMatch,
                    '$' => AttributeOp::SuffixMatch,
                    _ => AttributeOp::SubstringMatch,
                };
                self.advance();
                if !matches!(self.advance(), Token::Delim('=')) {
                    return Err(self.invalid(&format!("[{}{}", name, c)));
                }
                Some(op)
            }
            _ => None,
        };

        self.skip_whitespace();

        // Get value if operator exists
        let value = if op.is_some() {
            match self.advance() {
                Token::Ident(v) | Token::String(v) => Some(v),
                _ => return Err(self.invalid(&format!("[{}=", name))),
            }
        } else {
            None
        };

        self.skip_whitespace();

        // Check for case sensitivity flag
        let case_insensitive = match self.peek() {
            Token::Ident(flag) if op.is_some() && (flag.eq_ignore_ascii_case("i") || flag.eq_ignore_ascii_case("s")) => {
                let is_insensitive = flag.eq_ignore_ascii_case("i");
                self.advance();
                is_insensitive
            }
            _ => false,
        };

        self.skip_whitespace();

        // Consume ']'
        match self.advance() {
            Token::RightBracket => {}
            _ => return Err(self.invalid(&format!("[{}", name))),
        }

        Ok(SelectorPart::Attribute { name, op, value, case_insensitive })
    }

    fn parse_pseudo_selector(&mut self) -> CssResult<SelectorPart> {
        self.advance(); // consume first ':'

        // Check for pseudo-element (::)
        let is_element = if matches!(self.peek(), Token::Colon) {
            self.advance();
            true
        } else {
            false
        };

        // Get name - handle both Ident and Function tokens
        let (name, args) = match self.advance() {
            Token::Ident(name) => (name.to_ascii_lowercase(), None),
            // The tokenizer already consumed the '('
            Token::Function(name) => (name.to_ascii_lowercase(), Some(self.parse_pseudo_args()?)),
            _ => return Err(self.invalid(":")),
        };

        // Legacy pseudo-elements with single colon
        let is_element = is_element || matches!(name.as_str(), "before" | "after" | "first-line" | "first-letter");

        if is_element {
            Ok(SelectorPart::PseudoElement { name, args })
        } else {
            Ok(SelectorPart::PseudoClass { name, args })
        }
    }

    /// Raw argument text up to the matching ')'
    fn parse_pseudo_args(&mut self) -> CssResult<String> {
        let start = self.offset();
        let mut depth = 1;

        loop {
            let end = self.offset();
            match self.advance() {
                token if token.opens_block() => depth += 1,
                token if token.closes_block() => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.input[start..end].trim().to_string());
                    }
                }
                Token::Eof => return Err(self.invalid(&self.input[start..])),
                _ => {}
            }
        }
    }
}
