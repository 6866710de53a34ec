//! CSS Parser
//!
//! Parses CSS text into a [`CssDocument`]. Parsing never fails: any region
//! that cannot be interpreted is kept as an [`Item::Opaque`] span holding
//! its original text, so that it can be echoed back verbatim.

use log::debug;
use smallvec::SmallVec;

use crate::minify::{minify_tokens, MinifyMode};
use crate::selector::Selector;
use crate::tokenizer::{SpannedToken, Token, Tokenizer};
use crate::value::is_color_property;

/// A parsed stylesheet (or the nested rule list of an at-rule)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CssDocument {
    pub items: Vec<Item>,
}

/// One top-level construct of a stylesheet
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Style rule (selectors { declarations })
    Style(StyleRule),
    /// At-rule with a parsed prelude and optional nested rules
    AtRule(AtRule),
    /// Region the parser could not interpret, kept byte for byte
    Opaque(String),
}

/// A style rule (selector block)
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    /// Selector group, in source order
    pub selectors: SmallVec<[Selector; 4]>,
    /// Minified declarations
    pub declarations: DeclarationBlock,
}

/// An at-rule such as `@media screen { ... }` or `@import url(a.css);`
#[derive(Debug, Clone, PartialEq)]
pub struct AtRule {
    /// Lower-cased name without the `@`
    pub keyword: String,
    /// Minified prelude (may be empty)
    pub prelude: String,
    /// Nested rule list for grouping rules; `None` for statement at-rules
    pub nested: Option<CssDocument>,
}

/// Declarations inside `{ }`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarationBlock {
    pub declarations: Vec<Declaration>,
}

/// A single declaration
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// `name:value`, minified
    Property {
        name: String,
        value: String,
        important: bool,
    },
    /// A declaration that could not be parsed, trimmed raw text
    Unparsed(String),
}

/// At-rules whose block holds a rule list
const GROUPING_AT_RULES: &[&str] = &["media", "supports", "document", "-moz-document", "layer", "container"];

/// Statement at-rules that are understood (everything else is opaque)
const STATEMENT_AT_RULES: &[&str] = &["import", "namespace", "charset"];

impl CssDocument {
    /// Parse a stylesheet
    pub fn parse(input: &str) -> Self {
        let mut parser = CssParser::new(input);
        parser.parse_stylesheet()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Item {
    pub fn is_opaque(&self) -> bool {
        matches!(self, Item::Opaque(_))
    }
}

impl DeclarationBlock {
    /// Parse the inside of a declaration block, e.g. `color: red; margin: 0`
    pub fn parse(input: &str) -> Self {
        let parser = CssParser::new(input);
        parser.parse_declarations(0, parser.tokens.len())
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// CSS Parser
pub struct CssParser<'a> {
    input: &'a str,
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl<'a> CssParser<'a> {
    /// Create a new parser
    pub fn new(input: &'a str) -> Self {
        let tokens = Tokenizer::new(input).tokenize_all();
        Self { input, tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    /// Byte offset where the token at `index` starts
    fn offset_of(&self, index: usize) -> usize {
        self.tokens
            .get(index)
            .map(|t| t.span.start)
            .unwrap_or(self.input.len())
    }

    /// Byte offset just past the token at `index`
    fn end_of(&self, index: usize) -> usize {
        self.tokens
            .get(index)
            .map(|t| t.span.end)
            .unwrap_or(self.input.len())
    }

    fn skip_whitespace(&mut self) {
        while let Token::Whitespace = self.peek() {
            self.pos += 1;
        }
    }

    /// Parse a complete stylesheet
    pub fn parse_stylesheet(&mut self) -> CssDocument {
        CssDocument {
            items: self.parse_items(true),
        }
    }

    /// Parse items until end of input or, when nested, an unmatched `}`
    /// (which is left for the caller to consume)
    fn parse_items(&mut self, top_level: bool) -> Vec<Item> {
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();

            match self.peek() {
                Token::Eof => break,
                Token::Cdo | Token::Cdc if top_level => {
                    self.pos += 1;
                }
                Token::RightBrace if !top_level => break,
                Token::RightBrace => {
                    // Stray closing brace at the top level
                    let start = self.offset_of(self.pos);
                    let end = self.end_of(self.pos);
                    self.pos += 1;
                    items.push(Item::Opaque(self.input[start..end].to_string()));
                }
                Token::AtKeyword(_) => {
                    if let Some(item) = self.parse_at_rule() {
                        items.push(item);
                    }
                }
                _ => {
                    if let Some(item) = self.parse_qualified_rule(top_level) {
                        items.push(item);
                    }
                }
            }
        }

        items
    }

    /// Index of the `}` closing the block opened at `open`, or `None` if
    /// the block runs to the end of input
    fn find_block_end(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, spanned) in self.tokens.iter().enumerate().skip(open) {
            if spanned.token.opens_block() {
                depth += 1;
            } else if spanned.token.closes_block() {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Scan a prelude from the current position to the first `{`, `;` or
    /// `}` at nesting depth zero. Returns the index of that token, or the
    /// token count at end of input.
    fn scan_prelude(&self, stop_at_semicolon: bool) -> usize {
        let mut depth = 0usize;
        let mut i = self.pos;
        while let Some(spanned) = self.tokens.get(i) {
            match spanned.token {
                Token::LeftBrace | Token::RightBrace | Token::Semicolon if depth == 0 => {
                    if spanned.token != Token::Semicolon || stop_at_semicolon {
                        return i;
                    }
                }
                _ if spanned.token.opens_block() => depth += 1,
                _ if spanned.token.closes_block() => depth = depth.saturating_sub(1),
                _ => {}
            }
            i += 1;
        }
        i
    }

    /// Parse an at-rule starting at the current `@keyword` token
    fn parse_at_rule(&mut self) -> Option<Item> {
        let keyword = match self.peek() {
            Token::AtKeyword(name) => name.to_ascii_lowercase(),
            _ => return None,
        };
        let start_index = self.pos;
        let start = self.offset_of(start_index);
        self.pos += 1;

        let prelude_end = self.scan_prelude(true);
        let prelude = minify_tokens(&self.tokens[self.pos..prelude_end], self.input, MinifyMode::Prelude);

        match self.tokens.get(prelude_end).map(|t| &t.token) {
            Some(Token::LeftBrace) => {
                if GROUPING_AT_RULES.contains(&keyword.as_str()) {
                    self.pos = prelude_end + 1;
                    let nested = CssDocument {
                        items: self.parse_items(false),
                    };
                    // Consume the closing brace (absent at end of input)
                    if let Token::RightBrace = self.peek() {
                        self.pos += 1;
                    }
                    Some(Item::AtRule(AtRule {
                        keyword,
                        prelude,
                        nested: Some(nested),
                    }))
                } else {
                    let end_index = self.find_block_end(prelude_end);
                    let end = match end_index {
                        Some(i) => self.end_of(i),
                        None => self.input.len(),
                    };
                    self.pos = end_index.map(|i| i + 1).unwrap_or(self.tokens.len());
                    Some(Item::Opaque(self.input[start..end].to_string()))
                }
            }
            Some(Token::Semicolon) => {
                self.pos = prelude_end + 1;
                if STATEMENT_AT_RULES.contains(&keyword.as_str()) {
                    Some(Item::AtRule(AtRule {
                        keyword,
                        prelude,
                        nested: None,
                    }))
                } else {
                    let end = self.end_of(prelude_end);
                    Some(Item::Opaque(self.input[start..end].to_string()))
                }
            }
            // `}` (nested context) or end of input
            _ => {
                self.pos = prelude_end;
                if STATEMENT_AT_RULES.contains(&keyword.as_str()) {
                    return Some(Item::AtRule(AtRule {
                        keyword,
                        prelude,
                        nested: None,
                    }));
                }
                let end = self.offset_of(prelude_end);
                Some(Item::Opaque(self.input[start..end].trim_end().to_string()))
            }
        }
    }

    /// Parse a qualified (style) rule at the current position
    fn parse_qualified_rule(&mut self, top_level: bool) -> Option<Item> {
        let start_index = self.pos;
        let start = self.offset_of(start_index);
        let prelude_end = self.scan_prelude(false);

        let open = match self.tokens.get(prelude_end).map(|t| &t.token) {
            Some(Token::LeftBrace) => prelude_end,
            _ => {
                // No block: `}` in a nested list, or end of input
                self.pos = prelude_end;
                let raw = self.input[start..self.offset_of(prelude_end)].trim_end();
                debug!("CSS: rule without a block kept opaque: {:?}", raw);
                if raw.is_empty() && !top_level {
                    return None;
                }
                return Some(Item::Opaque(raw.to_string()));
            }
        };

        let close = self.find_block_end(open);
        let block_end = close.unwrap_or(self.tokens.len());
        self.pos = close.map(|i| i + 1).unwrap_or(self.tokens.len());

        let declarations = self.parse_declarations(open + 1, block_end);

        match self.parse_selector_group(start_index, open) {
            Some(selectors) => Some(Item::Style(StyleRule { selectors, declarations })),
            None => {
                let prelude_raw = &self.input[start..self.offset_of(open)];
                Some(Item::Opaque(format!("{}{{{}}}", prelude_raw, declarations)))
            }
        }
    }

    /// Split a rule prelude on top-level commas and parse each selector
    fn parse_selector_group(&self, from: usize, to: usize) -> Option<SmallVec<[Selector; 4]>> {
        let mut selectors = SmallVec::new();
        let mut depth = 0usize;
        let mut group_start = from;

        for i in from..=to {
            let at_boundary = i == to || (depth == 0 && self.tokens[i].token == Token::Comma);
            if at_boundary {
                let text = minify_tokens(&self.tokens[group_start..i], self.input, MinifyMode::Selector);
                match Selector::parse(&text) {
                    Ok(selector) => selectors.push(selector),
                    Err(err) => {
                        debug!("CSS: selector group kept opaque: {}", err);
                        return None;
                    }
                }
                group_start = i + 1;
                continue;
            }
            if self.tokens[i].token.opens_block() {
                depth += 1;
            } else if self.tokens[i].token.closes_block() {
                depth = depth.saturating_sub(1);
            }
        }

        Some(selectors)
    }

    /// Parse declarations from tokens in `[from, to)`
    fn parse_declarations(&self, from: usize, to: usize) -> DeclarationBlock {
        let mut declarations = Vec::new();
        let mut depth = 0usize;
        let mut segment_start = from;

        for i in from..=to {
            let at_boundary = i == to || (depth == 0 && self.tokens[i].token == Token::Semicolon);
            if at_boundary {
                if let Some(declaration) = self.parse_declaration(segment_start, i) {
                    declarations.push(declaration);
                }
                segment_start = i + 1;
                continue;
            }
            if self.tokens[i].token.opens_block() {
                depth += 1;
            } else if self.tokens[i].token.closes_block() {
                depth = depth.saturating_sub(1);
            }
        }

        DeclarationBlock { declarations }
    }

    /// Parse one declaration from tokens in `[from, to)`
    fn parse_declaration(&self, from: usize, to: usize) -> Option<Declaration> {
        let tokens = &self.tokens[from..to];
        let first = tokens.iter().position(|t| t.token != Token::Whitespace)?;
        let last = tokens.iter().rposition(|t| t.token != Token::Whitespace)?;
        let raw = self.input[tokens[first].span.start..tokens[last].span.end].trim();
        let unparsed = || Some(Declaration::Unparsed(raw.to_string()));

        let name = match &tokens[first].token {
            Token::Ident(name) => name,
            _ => return unparsed(),
        };

        let colon = match tokens[first + 1..=last].iter().position(|t| t.token != Token::Whitespace) {
            Some(offset) if tokens[first + 1 + offset].token == Token::Colon => first + 1 + offset,
            _ => return unparsed(),
        };

        let mut value_end = last + 1;
        let important = match important_suffix(&tokens[colon + 1..value_end]) {
            Some(bang) => {
                value_end = colon + 1 + bang;
                true
            }
            None => false,
        };
        let value_tokens = &tokens[colon + 1..value_end];

        if name.starts_with("--") {
            // Custom properties keep their value as written
            let value = match (value_tokens.first(), value_tokens.last()) {
                (Some(a), Some(b)) => self.input[a.span.start..b.span.end].trim().to_string(),
                _ => String::new(),
            };
            return Some(Declaration::Property {
                name: name.clone(),
                value,
                important,
            });
        }

        let name = name.to_ascii_lowercase();
        let mode = MinifyMode::Value {
            colors: is_color_property(&name),
        };
        let value = minify_tokens(value_tokens, self.input, mode);
        if value.is_empty() {
            return unparsed();
        }

        Some(Declaration::Property { name, value, important })
    }
}

/// If `tokens` end with `! important`, the index of the `!`
fn important_suffix(tokens: &[SpannedToken]) -> Option<usize> {
    let mut significant = tokens
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, t)| t.token != Token::Whitespace);

    match significant.next() {
        Some((_, t)) if matches!(&t.token, Token::Ident(s) if s.eq_ignore_ascii_case("important")) => {}
        _ => return None,
    }
    match significant.next() {
        Some((i, t)) if t.token == Token::Delim('!') => Some(i),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn style(item: &Item) -> &StyleRule {
        match item {
            Item::Style(rule) => rule,
            other => panic!("expected style rule, got {:?}", other),
        }
    }

    fn selector_texts(rule: &StyleRule) -> Vec<&str> {
        rule.selectors.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_simple_rule() {
        let doc = CssDocument::parse("p { color: red; }");
        assert_eq!(doc.items.len(), 1);
        let rule = style(&doc.items[0]);
        assert_eq!(selector_texts(rule), vec!["p"]);
        assert_eq!(
            rule.declarations.declarations,
            vec![Declaration::Property {
                name: "color".into(),
                value: "red".into(),
                important: false
            }]
        );
    }

    #[test]
    fn test_selector_group() {
        let doc = CssDocument::parse("div,span, *::first-letter { display: block; }");
        let rule = style(&doc.items[0]);
        assert_eq!(selector_texts(rule), vec!["div", "span", "*::first-letter"]);
    }

    #[test]
    fn test_selector_whitespace_collapsed() {
        let doc = CssDocument::parse("ul   li  >  a , a:not( .x ) {color:blue}");
        let rule = style(&doc.items[0]);
        assert_eq!(selector_texts(rule), vec!["ul li>a", "a:not(.x)"]);
    }

    #[test]
    fn test_important() {
        let doc = CssDocument::parse("p { color: red ! IMPORTANT; margin: 0 }");
        let rule = style(&doc.items[0]);
        assert_eq!(
            rule.declarations.declarations[0],
            Declaration::Property {
                name: "color".into(),
                value: "red".into(),
                important: true
            }
        );
    }

    #[test]
    fn test_property_name_lowercased() {
        let doc = CssDocument::parse("p { COLOR: Red }");
        let rule = style(&doc.items[0]);
        assert!(matches!(
            &rule.declarations.declarations[0],
            Declaration::Property { name, value, .. } if name == "color" && value == "Red"
        ));
    }

    #[test]
    fn test_custom_property_kept_raw() {
        let doc = CssDocument::parse("p { --Main-Color:  #FFFFFF  ; }");
        let rule = style(&doc.items[0]);
        assert!(matches!(
            &rule.declarations.declarations[0],
            Declaration::Property { name, value, .. } if name == "--Main-Color" && value == "#FFFFFF"
        ));
    }

    #[test]
    fn test_unparsed_declaration() {
        let doc = CssDocument::parse("p { color red; margin: 0; : x }");
        let rule = style(&doc.items[0]);
        assert_eq!(rule.declarations.declarations.len(), 3);
        assert_eq!(rule.declarations.declarations[0], Declaration::Unparsed("color red".into()));
        assert_eq!(rule.declarations.declarations[2], Declaration::Unparsed(": x".into()));
    }

    #[test]
    fn test_media_rule() {
        let doc = CssDocument::parse("@media screen,print { * { margin: 0px; } }");
        match &doc.items[0] {
            Item::AtRule(rule) => {
                assert_eq!(rule.keyword, "media");
                assert_eq!(rule.prelude, "screen,print");
                let nested = rule.nested.as_ref().unwrap();
                assert_eq!(selector_texts(style(&nested.items[0])), vec!["*"]);
            }
            other => panic!("expected at-rule, got {:?}", other),
        }
    }

    #[test]
    fn test_media_prelude_minified() {
        let doc = CssDocument::parse("@MEDIA only screen and ( max-width : 600px ) { a{color:red} }");
        match &doc.items[0] {
            Item::AtRule(rule) => {
                assert_eq!(rule.keyword, "media");
                assert_eq!(rule.prelude, "only screen and (max-width:600px)");
            }
            other => panic!("expected at-rule, got {:?}", other),
        }
    }

    #[test]
    fn test_import_rule() {
        let doc = CssDocument::parse("@import url(\"a.css\")  screen;\np{}");
        assert_eq!(
            doc.items[0],
            Item::AtRule(AtRule {
                keyword: "import".into(),
                prelude: "url(\"a.css\") screen".into(),
                nested: None
            })
        );
        assert_eq!(doc.items.len(), 2);
    }

    #[test]
    fn test_unparseable_selector_is_opaque() {
        let doc = CssDocument::parse("!huh! {background: white; } @huh { display: block; }");
        assert_eq!(
            doc.items,
            vec![
                Item::Opaque("!huh! {background:#fff}".into()),
                Item::Opaque("@huh { display: block; }".into()),
            ]
        );
    }

    #[test]
    fn test_font_face_is_opaque() {
        let css = "@font-face { font-family: X; src: url(x.woff) }";
        let doc = CssDocument::parse(css);
        assert_eq!(doc.items, vec![Item::Opaque(css.into())]);
    }

    #[test]
    fn test_unknown_statement_at_rule_is_opaque() {
        let doc = CssDocument::parse("@layer base, theme; a{}");
        assert_eq!(doc.items[0], Item::Opaque("@layer base, theme;".into()));
    }

    #[test]
    fn test_unterminated_rule() {
        let doc = CssDocument::parse("a { color: red");
        let rule = style(&doc.items[0]);
        assert_eq!(rule.declarations.declarations.len(), 1);

        let doc = CssDocument::parse("a, b");
        assert_eq!(doc.items, vec![Item::Opaque("a, b".into())]);
    }

    #[test]
    fn test_stray_brace_in_nested_list() {
        let doc = CssDocument::parse("@media print { a }\nb{color:red}");
        match &doc.items[0] {
            Item::AtRule(rule) => {
                let nested = rule.nested.as_ref().unwrap();
                assert_eq!(nested.items, vec![Item::Opaque("a".into())]);
            }
            other => panic!("expected at-rule, got {:?}", other),
        }
        assert_eq!(selector_texts(style(&doc.items[1])), vec!["b"]);
    }

    #[test]
    fn test_cdo_cdc_skipped() {
        let doc = CssDocument::parse("<!-- p{margin:0} -->");
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn test_comments_removed() {
        let doc = CssDocument::parse("/* head */ p /* x */ { color /* y */ : red; }");
        let rule = style(&doc.items[0]);
        assert_eq!(selector_texts(rule), vec!["p"]);
        assert!(matches!(
            &rule.declarations.declarations[0],
            Declaration::Property { name, value, .. } if name == "color" && value == "red"
        ));
    }

    #[test]
    fn test_empty_stylesheet() {
        assert!(CssDocument::parse("").is_empty());
        assert!(CssDocument::parse("  /* nothing */ ").is_empty());
    }

    #[test]
    fn test_declaration_block_parse() {
        let block = DeclarationBlock::parse("color: white; margin:0");
        assert_eq!(block.declarations.len(), 2);
    }
}
