//! Foldline CSS Parser
//!
//! Fault-tolerant CSS tokenizer, stylesheet parser and minifying serializer.

mod error;
mod minify;
mod parser;
mod selector;
mod tokenizer;
mod value;

pub use error::{CssError, CssResult, SourceLocation};
pub use minify::{close_unterminated, escape_for_style_element, minify_tokens, MinifyMode};
pub use parser::{AtRule, CssDocument, CssParser, Declaration, DeclarationBlock, Item, StyleRule};
pub use selector::{AttributeOp, Combinator, Selector, SelectorPart};
pub use tokenizer::{HashType, SpannedToken, Token, Tokenizer};
pub use value::{is_color_property, Color, ValueParser};
