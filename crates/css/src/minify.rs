//! Minifying serializer
//!
//! `Display` for the document types writes minified CSS. Token runs
//! (selectors, values, at-rule preludes) are re-emitted from their source
//! text with only the whitespace that changes meaning kept.

use std::fmt;

use crate::parser::{AtRule, CssDocument, Declaration, DeclarationBlock, Item, StyleRule};
use crate::tokenizer::{SpannedToken, Token, Tokenizer};
use crate::value::ValueParser;

/// How whitespace between tokens is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinifyMode {
    /// Selector text: whitespace is a descendant combinator
    Selector,
    /// Declaration value, optionally rewriting colors
    Value { colors: bool },
    /// At-rule prelude such as a media query list
    Prelude,
}

impl MinifyMode {
    /// Keep a single space between `prev` and `next` that had whitespace
    /// (or a comment) between them in the source?
    fn keeps_space(self, prev: &Token, next: &Token, bracket_depth: usize) -> bool {
        if matches!(prev, Token::Function(_) | Token::LeftParen | Token::LeftBracket)
            || matches!(next, Token::RightParen | Token::RightBracket)
            || matches!(prev, Token::Comma)
            || matches!(next, Token::Comma)
        {
            return false;
        }

        match self {
            MinifyMode::Selector => {
                if bracket_depth > 0 {
                    return would_merge(prev, next);
                }
                !is_combinator(prev) && !is_combinator(next)
            }
            MinifyMode::Value { .. } => !matches!(prev, Token::Delim('/')) && !matches!(next, Token::Delim('/')),
            MinifyMode::Prelude => !matches!(prev, Token::Colon) && !matches!(next, Token::Colon),
        }
    }
}

fn is_combinator(token: &Token) -> bool {
    matches!(token, Token::Delim('>') | Token::Delim('+') | Token::Delim('~'))
}

fn is_word(token: &Token) -> bool {
    matches!(
        token,
        Token::Ident(_)
            | Token::Function(_)
            | Token::Number(_)
            | Token::Percentage(_)
            | Token::Dimension(..)
            | Token::Hash(..)
            | Token::Url(_)
    )
}

/// Would the two tokens re-tokenize as one if written without a space?
fn would_merge(prev: &Token, next: &Token) -> bool {
    is_word(prev) && is_word(next)
}

/// Push the closer `token` opens, or pop the one it closes
fn track_nesting(closers: &mut Vec<char>, token: &Token) {
    let close = match token {
        Token::Function(_) | Token::LeftParen => return closers.push(')'),
        Token::LeftBracket => return closers.push(']'),
        Token::LeftBrace => return closers.push('}'),
        Token::RightParen => ')',
        Token::RightBracket => ']',
        Token::RightBrace => '}',
        _ => return,
    };
    // A stray closer inside another block is an ordinary token
    if closers.last() == Some(&close) {
        closers.pop();
    }
}

/// Does `text` end with an unescaped `close`?
fn ends_with_closer(text: &str, close: char) -> bool {
    match text.strip_suffix(close) {
        Some(body) => body.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0,
        None => false,
    }
}

/// Is a url token (or its bad-url remnant) missing its `)`?
fn is_open_url(token: &Token, text: &str) -> bool {
    matches!(token, Token::Url(_) | Token::BadUrl) && !ends_with_closer(text, ')')
}

/// Re-emit a token run with redundant whitespace and comments removed
///
/// Functions, parentheses, brackets and urls the run leaves open are
/// closed at its end, as the end of input would have closed them.
pub fn minify_tokens(tokens: &[SpannedToken], input: &str, mode: MinifyMode) -> String {
    let mut out = String::new();
    let mut prev: Option<&SpannedToken> = None;
    let mut pending_space = false;
    let mut bracket_depth = 0usize;
    let mut closers: Vec<char> = Vec::new();
    let rewrite_colors = matches!(mode, MinifyMode::Value { colors: true });
    let mut i = 0;

    while i < tokens.len() {
        let spanned = &tokens[i];
        if spanned.token == Token::Whitespace {
            pending_space = true;
            i += 1;
            continue;
        }

        if let Some(p) = prev {
            // A comment with no whitespace around it leaves a gap
            if p.span.end < spanned.span.start {
                pending_space = true;
            }
            if pending_space && !out.ends_with('\n') && mode.keeps_space(&p.token, &spanned.token, bracket_depth) {
                out.push(' ');
            }
        }
        pending_space = false;

        if rewrite_colors {
            if let Some((text, last)) = rewrite_color(tokens, i) {
                out.push_str(&text);
                prev = Some(&tokens[last]);
                i = last + 1;
                continue;
            }
        }

        match spanned.token {
            Token::LeftBracket => bracket_depth += 1,
            Token::RightBracket => bracket_depth = bracket_depth.saturating_sub(1),
            _ => {}
        }
        track_nesting(&mut closers, &spanned.token);

        out.push_str(spanned.text(input));
        if spanned.token == Token::BadString {
            // The newline that ended it in the source
            out.push('\n');
        }
        prev = Some(spanned);
        i += 1;
    }

    if let Some(last) = prev {
        if is_open_url(&last.token, last.text(input)) {
            out.push(')');
        }
    }
    out.extend(closers.iter().rev());
    out
}

/// `css` followed by whatever closes the blocks, functions, strings, urls
/// and comments it leaves open, so that text appended to it starts at the
/// top level
pub fn close_unterminated(css: &str) -> String {
    let tokens = Tokenizer::new(css).tokenize_all();
    let mut closers: Vec<char> = Vec::new();
    for spanned in &tokens {
        track_nesting(&mut closers, &spanned.token);
    }

    let mut out = css.to_string();
    let last = tokens.iter().rev().find(|t| t.token != Token::Whitespace);
    match last {
        Some(t) if t.token == Token::BadString && t.span.end == css.len() => out.push('\n'),
        Some(t) if is_open_url(&t.token, t.text(css)) => out.push(')'),
        _ => {
            // Only whitespace and comments follow the last token
            let tail = &css[last.map(|t| t.span.end).unwrap_or(0)..];
            if let Some(pos) = tail.rfind("/*") {
                if !tail[pos + 2..].contains("*/") {
                    out.push_str("*/");
                }
            }
        }
    }
    out.extend(closers.iter().rev());
    out
}

/// Canonical color text for the token at `index`, with the index of the
/// last token it covers
fn rewrite_color(tokens: &[SpannedToken], index: usize) -> Option<(String, usize)> {
    match &tokens[index].token {
        Token::Ident(name) => ValueParser::canonical_ident(name).map(|text| (text, index)),
        Token::Hash(hex, _) => ValueParser::canonical_hash(hex).map(|text| (text, index)),
        Token::Function(name) if name.eq_ignore_ascii_case("rgb") || name.eq_ignore_ascii_case("rgba") => {
            let close = tokens[index + 1..]
                .iter()
                .position(|t| t.token == Token::RightParen)
                .map(|offset| index + 1 + offset)?;
            let args: Vec<Token> = tokens[index + 1..close].iter().map(|t| t.token.clone()).collect();
            ValueParser::parse_rgb(&args).map(|color| (color.to_css(), close))
        }
        _ => None,
    }
}

/// Escape text so it cannot terminate an inline `<style>` element
pub fn escape_for_style_element(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(pos) = rest.find("</") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 2..];
        if tail.get(..5).map(|s| s.eq_ignore_ascii_case("style")).unwrap_or(false) {
            out.push_str("<\\/");
        } else {
            out.push_str("</");
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}

impl fmt::Display for CssDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Style(rule) => write!(f, "{}", rule),
            Item::AtRule(rule) => write!(f, "{}", rule),
            Item::Opaque(raw) => f.write_str(raw),
        }
    }
}

impl fmt::Display for StyleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, selector) in self.selectors.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(&selector.text)?;
        }
        write!(f, "{{{}}}", self.declarations)
    }
}

impl fmt::Display for AtRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.keyword)?;
        if !self.prelude.is_empty() {
            write!(f, " {}", self.prelude)?;
        }
        match &self.nested {
            Some(nested) => write!(f, "{{{}}}", nested),
            None => f.write_str(";"),
        }
    }
}

impl fmt::Display for DeclarationBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, declaration) in self.declarations.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", declaration)?;
        }
        Ok(())
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Property { name, value, important } => {
                write!(f, "{}:{}", name, value)?;
                if *important {
                    f.write_str("!important")?;
                }
                Ok(())
            }
            Declaration::Unparsed(raw) => f.write_str(raw),
        }
    }
}
