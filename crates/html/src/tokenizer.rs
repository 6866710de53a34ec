//! HTML5 Tokenizer
//!
//! Converts HTML text into a stream of tokens. Every token records the byte
//! span it was read from, so a document can be rewritten by splicing token
//! text without re-serializing anything that was not touched. Input that
//! does not form a complete tag is returned as text.

use std::ops::Range;

use smallvec::SmallVec;

/// An HTML token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// DOCTYPE declaration
    Doctype {
        name: String,
    },
    /// Start tag; attribute names are lower-cased and values decoded
    StartTag {
        name: String,
        attributes: SmallVec<[(String, String); 4]>,
        self_closing: bool,
    },
    /// End tag
    EndTag {
        name: String,
    },
    /// Character data exactly as written (entities are not decoded)
    Text(String),
    /// Comment
    Comment(String),
}

impl Token {
    /// Value of the named attribute on a start tag
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            Token::StartTag { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Is this an end tag with the given name?
    pub fn is_end_tag(&self, tag: &str) -> bool {
        matches!(self, Token::EndTag { name } if name == tag)
    }
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

/// Elements whose content is not markup
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes",
];

/// Tag state machine states
#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    TagName,
    BeforeAttributeName,
    AttributeName,
    AfterAttributeName,
    BeforeAttributeValue,
    AttributeValueDoubleQuoted,
    AttributeValueSingleQuoted,
    AttributeValueUnquoted,
    AfterAttributeValueQuoted,
    SelfClosingStartTag,
}

/// HTML5 tokenizer
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    state: State,

    // Current tag being built
    current_tag_name: String,
    current_tag_is_end: bool,
    current_tag_self_closing: bool,
    current_attributes: SmallVec<[(String, String); 4]>,
    current_attr_name: String,
    current_attr_value: String,

    // Set after a start tag whose content is raw text (script, style)
    raw_text_tag: Option<String>,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer for the given input
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            state: State::TagName,

            current_tag_name: String::new(),
            current_tag_is_end: false,
            current_tag_self_closing: false,
            current_attributes: SmallVec::new(),
            current_attr_name: String::new(),
            current_attr_value: String::new(),

            raw_text_tag: None,
        }
    }

    /// Get the next token, or `None` at end of input
    pub fn next_token(&mut self) -> Option<SpannedToken> {
        if self.pos >= self.input.len() {
            return None;
        }
        let start = self.pos;

        if let Some(tag) = self.raw_text_tag.take() {
            let end = find_raw_text_end(&self.input[start..], &tag)
                .map(|offset| start + offset)
                .unwrap_or(self.input.len());
            if end > start {
                self.pos = end;
                return Some(self.spanned(Token::Text(self.input[start..end].to_string()), start));
            }
        }

        if self.starts_markup() {
            if let Some(token) = self.consume_markup() {
                return Some(self.spanned(token, start));
            }
            // Not a complete tag: the '<' is just text
            self.pos = start;
            self.consume();
        }

        while self.current_char().is_some() && !self.starts_markup() {
            self.consume();
        }
        Some(self.spanned(Token::Text(self.input[start..self.pos].to_string()), start))
    }

    /// Tokenize all remaining input
    pub fn tokenize_all(&mut self) -> Vec<SpannedToken> {
        std::iter::from_fn(|| self.next_token()).collect()
    }

    fn spanned(&self, token: Token, start: usize) -> SpannedToken {
        SpannedToken {
            token,
            span: start..self.pos,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Peek at the current character without consuming
    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Consume and return the current character
    fn consume(&mut self) -> Option<char> {
        let c = self.current_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Check if we're at a specific string (case-insensitive)
    fn at_str_ci(&self, s: &str) -> bool {
        self.rest()
            .get(..s.len())
            .map(|prefix| prefix.eq_ignore_ascii_case(s))
            .unwrap_or(false)
    }

    /// Does the input at the current position open a tag, comment or doctype?
    fn starts_markup(&self) -> bool {
        let mut chars = self.rest().chars();
        if chars.next() != Some('<') {
            return false;
        }
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => true,
            Some('!') | Some('?') => true,
            Some('/') => chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false),
            _ => false,
        }
    }

    /// Consume a tag, comment or doctype starting at '<'
    fn consume_markup(&mut self) -> Option<Token> {
        if self.at_str_ci("<!--") {
            self.pos += 4;
            return Some(Token::Comment(self.consume_until("-->")));
        }
        if self.at_str_ci("<!doctype") {
            self.pos += 9;
            let body = self.consume_until(">");
            let name = body.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
            return Some(Token::Doctype { name });
        }
        if self.at_str_ci("<!") || self.at_str_ci("<?") {
            // Bogus comment
            self.pos += 2;
            return Some(Token::Comment(self.consume_until(">")));
        }

        self.consume(); // '<'
        self.reset_tag();
        if self.current_char() == Some('/') {
            self.consume();
            self.current_tag_is_end = true;
        }
        self.consume_tag()
    }

    /// Consume up to and including `terminator` (or to end of input),
    /// returning the text before it
    fn consume_until(&mut self, terminator: &str) -> String {
        match self.rest().find(terminator) {
            Some(offset) => {
                let text = self.rest()[..offset].to_string();
                self.pos += offset + terminator.len();
                text
            }
            None => {
                let text = self.rest().to_string();
                self.pos = self.input.len();
                text
            }
        }
    }

    /// Reset tag state
    fn reset_tag(&mut self) {
        self.state = State::TagName;
        self.current_tag_name.clear();
        self.current_tag_is_end = false;
        self.current_tag_self_closing = false;
        self.current_attributes.clear();
        self.current_attr_name.clear();
        self.current_attr_value.clear();
    }

    /// Push current attribute
    fn push_attribute(&mut self) {
        if !self.current_attr_name.is_empty() {
            let name = self.current_attr_name.to_ascii_lowercase();
            // First occurrence wins
            if !self.current_attributes.iter().any(|(k, _)| *k == name) {
                let value = html_escape::decode_html_entities(&self.current_attr_value).into_owned();
                self.current_attributes.push((name, value));
            }
        }
        self.current_attr_name.clear();
        self.current_attr_value.clear();
    }

    /// Build the token for the tag that just closed
    fn finish_tag(&mut self) -> Token {
        let name = std::mem::take(&mut self.current_tag_name);
        if self.current_tag_is_end {
            return Token::EndTag { name };
        }
        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.raw_text_tag = Some(name.clone());
        }
        Token::StartTag {
            name,
            attributes: std::mem::take(&mut self.current_attributes),
            self_closing: self.current_tag_self_closing,
        }
    }

    /// Run the tag state machine until '>' (or end of input, giving `None`)
    fn consume_tag(&mut self) -> Option<Token> {
        while let Some(c) = self.consume() {
            let done = match self.state {
                State::TagName => self.tag_name_state(c),
                State::BeforeAttributeName => self.before_attribute_name_state(c),
                State::AttributeName => self.attribute_name_state(c),
                State::AfterAttributeName => self.after_attribute_name_state(c),
                State::BeforeAttributeValue => self.before_attribute_value_state(c),
                State::AttributeValueDoubleQuoted => self.attribute_value_quoted_state(c, '"'),
                State::AttributeValueSingleQuoted => self.attribute_value_quoted_state(c, '\''),
                State::AttributeValueUnquoted => self.attribute_value_unquoted_state(c),
                State::AfterAttributeValueQuoted => self.after_attribute_value_quoted_state(c),
                State::SelfClosingStartTag => self.self_closing_start_tag_state(c),
            };
            if done {
                return Some(self.finish_tag());
            }
        }
        None
    }

    // State implementations; each returns true when the tag is complete

    fn tag_name_state(&mut self, c: char) -> bool {
        match c {
            '\t' | '\n' | '\x0C' | '\r' | ' ' => self.state = State::BeforeAttributeName,
            '/' => self.state = State::SelfClosingStartTag,
            '>' => return true,
            c => self.current_tag_name.push(c.to_ascii_lowercase()),
        }
        false
    }

    fn before_attribute_name_state(&mut self, c: char) -> bool {
        match c {
            '\t' | '\n' | '\x0C' | '\r' | ' ' => {}
            '/' => self.state = State::SelfClosingStartTag,
            '>' => return true,
            c => {
                self.current_attr_name.clear();
                self.current_attr_value.clear();
                self.current_attr_name.push(c);
                self.state = State::AttributeName;
            }
        }
        false
    }

    fn attribute_name_state(&mut self, c: char) -> bool {
        match c {
            '\t' | '\n' | '\x0C' | '\r' | ' ' => self.state = State::AfterAttributeName,
            '/' => {
                self.push_attribute();
                self.state = State::SelfClosingStartTag;
            }
            '=' => self.state = State::BeforeAttributeValue,
            '>' => {
                self.push_attribute();
                return true;
            }
            c => self.current_attr_name.push(c),
        }
        false
    }

    fn after_attribute_name_state(&mut self, c: char) -> bool {
        match c {
            '\t' | '\n' | '\x0C' | '\r' | ' ' => {}
            '/' => {
                self.push_attribute();
                self.state = State::SelfClosingStartTag;
            }
            '=' => self.state = State::BeforeAttributeValue,
            '>' => {
                self.push_attribute();
                return true;
            }
            c => {
                self.push_attribute();
                self.current_attr_name.push(c);
                self.state = State::AttributeName;
            }
        }
        false
    }

    fn before_attribute_value_state(&mut self, c: char) -> bool {
        match c {
            '\t' | '\n' | '\x0C' | '\r' | ' ' => {}
            '"' => self.state = State::AttributeValueDoubleQuoted,
            '\'' => self.state = State::AttributeValueSingleQuoted,
            '>' => {
                self.push_attribute();
                return true;
            }
            c => {
                self.current_attr_value.push(c);
                self.state = State::AttributeValueUnquoted;
            }
        }
        false
    }

    fn attribute_value_quoted_state(&mut self, c: char, quote: char) -> bool {
        if c == quote {
            self.push_attribute();
            self.state = State::AfterAttributeValueQuoted;
        } else {
            self.current_attr_value.push(c);
        }
        false
    }

    fn attribute_value_unquoted_state(&mut self, c: char) -> bool {
        match c {
            '\t' | '\n' | '\x0C' | '\r' | ' ' => {
                self.push_attribute();
                self.state = State::BeforeAttributeName;
            }
            '>' => {
                self.push_attribute();
                return true;
            }
            c => self.current_attr_value.push(c),
        }
        false
    }

    fn after_attribute_value_quoted_state(&mut self, c: char) -> bool {
        match c {
            '\t' | '\n' | '\x0C' | '\r' | ' ' => self.state = State::BeforeAttributeName,
            '/' => self.state = State::SelfClosingStartTag,
            '>' => return true,
            c => {
                // Missing whitespace between attributes
                self.current_attr_name.push(c);
                self.state = State::AttributeName;
            }
        }
        false
    }

    fn self_closing_start_tag_state(&mut self, c: char) -> bool {
        if c == '>' {
            self.current_tag_self_closing = true;
            return true;
        }
        self.state = State::BeforeAttributeName;
        self.before_attribute_name_state(c)
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = SpannedToken;

    fn next(&mut self) -> Option<SpannedToken> {
        self.next_token()
    }
}

/// Offset of the `</tag` that ends a raw text element
fn find_raw_text_end(text: &str, tag: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = text[from..].find("</") {
        let at = from + offset;
        let name_end = at + 2 + tag.len();
        let name_matches = text
            .get(at + 2..name_end)
            .map(|name| name.eq_ignore_ascii_case(tag))
            .unwrap_or(false);
        if name_matches {
            match text[name_end..].chars().next() {
                None | Some('>') | Some('/') | Some('\t') | Some('\n') | Some('\x0C') | Some('\r') | Some(' ') => {
                    return Some(at)
                }
                _ => {}
            }
        }
        from = at + 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Tokenizer::new(input).map(|t| t.token).collect()
    }

    #[test]
    fn test_simple_element() {
        let tokens = tokens("<div>hello</div>");
        assert_eq!(tokens.len(), 3);
        assert!(matches!(&tokens[0], Token::StartTag { name, .. } if name == "div"));
        assert_eq!(tokens[1], Token::Text("hello".into()));
        assert!(tokens[2].is_end_tag("div"));
    }

    #[test]
    fn test_attributes() {
        let tokens = tokens(r#"<a href="test" class='foo' data-x=1 hidden>"#);
        assert_eq!(tokens[0].attribute("href"), Some("test"));
        assert_eq!(tokens[0].attribute("class"), Some("foo"));
        assert_eq!(tokens[0].attribute("data-x"), Some("1"));
        assert_eq!(tokens[0].attribute("hidden"), Some(""));
        assert_eq!(tokens[0].attribute("missing"), None);
    }

    #[test]
    fn test_attribute_entities_decoded() {
        let tokens = tokens(r#"<link href="a.css?x=1&amp;y=2">"#);
        assert_eq!(tokens[0].attribute("href"), Some("a.css?x=1&y=2"));
    }

    #[test]
    fn test_uppercase_names_lowercased() {
        let tokens = tokens("<LINK REL=StyleSheet HREF=a.css>");
        assert!(matches!(&tokens[0], Token::StartTag { name, .. } if name == "link"));
        assert_eq!(tokens[0].attribute("rel"), Some("StyleSheet"));
    }

    #[test]
    fn test_self_closing() {
        let tokens = tokens("<link rel=stylesheet href=a.css />");
        assert!(matches!(&tokens[0], Token::StartTag { self_closing: true, .. }));
        assert_eq!(tokens[0].attribute("href"), Some("a.css"));
    }

    #[test]
    fn test_spans_are_lossless() {
        let input = "<!DOCTYPE html><HEAD ><style>a{}</style><!-- c --><p class=\"x\">t &amp; u</p>< not a tag";
        let spanned = Tokenizer::new(input).tokenize_all();
        let rebuilt: String = spanned.iter().map(|t| t.text(input)).collect();
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_style_content_is_raw_text() {
        let tokens = tokens("<style>a > b { content: '<p>' }</style><p>");
        assert!(matches!(&tokens[0], Token::StartTag { name, .. } if name == "style"));
        assert_eq!(tokens[1], Token::Text("a > b { content: '<p>' }".into()));
        assert!(tokens[2].is_end_tag("style"));
        assert!(matches!(&tokens[3], Token::StartTag { name, .. } if name == "p"));
    }

    #[test]
    fn test_script_with_fake_end_tag() {
        let tokens = tokens("<script>var s = '</scripts>';</script>");
        assert_eq!(tokens[1], Token::Text("var s = '</scripts>';".into()));
        assert!(tokens[2].is_end_tag("script"));
    }

    #[test]
    fn test_empty_style() {
        let tokens = tokens("<style></style>");
        assert_eq!(tokens.len(), 2);
        assert!(tokens[1].is_end_tag("style"));
    }

    #[test]
    fn test_doctype() {
        let tokens = tokens("<!DOCTYPE html>");
        assert_eq!(tokens[0], Token::Doctype { name: "html".into() });
    }

    #[test]
    fn test_comment() {
        let tokens = tokens("<!-- this is a comment -->");
        assert_eq!(tokens[0], Token::Comment(" this is a comment ".into()));
    }

    #[test]
    fn test_unterminated_tag_is_text() {
        let tokens = tokens("a <b c=\"d");
        assert_eq!(tokens, vec![Token::Text("a ".into()), Token::Text("<b c=\"d".into())]);
    }
}
