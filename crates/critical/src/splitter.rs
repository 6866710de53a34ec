//! Selector splitter
//!
//! Partitions a parsed stylesheet into the rules needed for the first
//! render. Per selector, in order:
//!
//! 1. the selector text is in the critical set;
//! 2. the selector is only pseudo-classes/elements (`:hover`), which cannot
//!    be judged statically and is kept;
//! 3. the selector minus its trailing pseudo-element is in the set
//!    (`*::first-letter` when `*` is critical);
//!
//! otherwise it is left for the deferred stylesheet. Opaque content is
//! always kept.

use foldline_css::{minify_tokens, AtRule, CssDocument, Item, MinifyMode, Selector, StyleRule, Tokenizer};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::selectors::CriticalSelectorSet;

/// Classifies selectors against one critical selector set
pub struct SelectorSplitter {
    /// Set members in minified selector form
    critical: FxHashSet<String>,
}

impl SelectorSplitter {
    pub fn new(set: &CriticalSelectorSet) -> Self {
        let critical = set.iter().map(normalize_selector).filter(|s| !s.is_empty()).collect();
        Self { critical }
    }

    /// Is this selector needed for the first render?
    pub fn is_critical(&self, selector: &Selector) -> bool {
        if self.critical.contains(&selector.text) {
            return true;
        }
        if selector.is_pseudo_only() {
            return true;
        }
        selector
            .base_text()
            .map(|base| self.critical.contains(base))
            .unwrap_or(false)
    }

    /// The critical subset of `document`, in document order
    pub fn split(&self, document: &CssDocument) -> CssDocument {
        CssDocument {
            items: document.items.iter().filter_map(|item| self.split_item(item)).collect(),
        }
    }

    /// Minified critical CSS for `document`
    pub fn critical_css(&self, document: &CssDocument) -> String {
        self.split(document).to_string()
    }

    fn split_item(&self, item: &Item) -> Option<Item> {
        match item {
            Item::Style(rule) => self.split_style_rule(rule).map(Item::Style),
            Item::AtRule(rule) => self.split_at_rule(rule).map(Item::AtRule),
            Item::Opaque(raw) => Some(Item::Opaque(raw.clone())),
        }
    }

    fn split_style_rule(&self, rule: &StyleRule) -> Option<StyleRule> {
        let selectors: SmallVec<[Selector; 4]> =
            rule.selectors.iter().filter(|s| self.is_critical(s)).cloned().collect();
        if selectors.is_empty() {
            return None;
        }
        Some(StyleRule {
            selectors,
            declarations: rule.declarations.clone(),
        })
    }

    fn split_at_rule(&self, rule: &AtRule) -> Option<AtRule> {
        let nested = match &rule.nested {
            Some(nested) => nested,
            // Meaningless inside an inline <style>
            None if rule.keyword == "charset" => return None,
            None => return Some(rule.clone()),
        };

        let critical = self.split(nested);
        if critical.is_empty() {
            return None;
        }

        let prelude = if rule.keyword == "media" {
            narrow_media_list(&rule.prelude)?
        } else {
            rule.prelude.clone()
        };

        Some(AtRule {
            keyword: rule.keyword.clone(),
            prelude,
            nested: Some(critical),
        })
    }
}

/// Minified form of a selector given as text
fn normalize_selector(selector: &str) -> String {
    let tokens = Tokenizer::new(selector).tokenize_all();
    minify_tokens(&tokens, selector, MinifyMode::Selector)
}

/// Split a prelude on commas outside parentheses
pub fn split_top_level_commas(prelude: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in prelude.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(prelude[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(prelude[start..].trim());
    parts
}

/// Keep only the media queries that can apply to the initial on-screen
/// render. `None` when none of them can.
pub fn narrow_media_list(prelude: &str) -> Option<String> {
    if prelude.trim().is_empty() {
        return Some(String::new());
    }
    let kept: Vec<&str> = split_top_level_commas(prelude)
        .into_iter()
        .filter(|query| media_query_applies(query))
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(","))
    }
}

fn media_query_applies(query: &str) -> bool {
    let mut words = query.split_whitespace();
    let first = match words.next() {
        Some(word) => word.to_ascii_lowercase(),
        None => return false,
    };
    match first.as_str() {
        "not" => {
            let negated = match words.next() {
                Some(word) => word.to_ascii_lowercase(),
                None => return false,
            };
            if negated.starts_with('(') {
                return true;
            }
            // `not screen and (...)` still matches screens failing the features
            words.next().is_some() || !is_screen_type(&negated)
        }
        "only" => match words.next() {
            Some(word) => word.starts_with('(') || is_screen_type(&word.to_ascii_lowercase()),
            None => false,
        },
        // A query made of feature expressions only
        _ if first.starts_with('(') || first.starts_with("not(") => true,
        _ => is_screen_type(&first),
    }
}

fn is_screen_type(media_type: &str) -> bool {
    matches!(media_type, "all" | "screen")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn critical(selectors: &[&str], css: &str) -> String {
        let set = CriticalSelectorSet::new(selectors.iter().copied(), 1);
        SelectorSplitter::new(&set).critical_css(&CssDocument::parse(css))
    }

    #[test]
    fn test_grouped_selector_split() {
        assert_eq!(
            critical(&["div", "*"], "div,span,*::first-letter { display: block; }p { display: inline; }"),
            "div,*::first-letter{display:block}"
        );
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(critical(&["*"], "*,p {display: none; } span {display: inline; }"), "*{display:none}");
    }

    #[test]
    fn test_pseudo_only_retained() {
        assert_eq!(critical(&["div"], ":hover { border: 2px solid red; }"), ":hover{border:2px solid red}");
        assert_eq!(critical(&[], "::selection{color:red}"), "::selection{color:red}");
    }

    #[test]
    fn test_pseudo_element_base_match() {
        assert_eq!(critical(&["p"], "p::before{content:'x'}a::before{content:'y'}"), "p::before{content:'x'}");
        // Only a trailing pseudo-element is stripped
        assert_eq!(critical(&["a"], "a:hover{color:red}"), "");
    }

    #[test]
    fn test_set_members_normalized() {
        assert_eq!(critical(&["ul  >  li"], "ul>li{margin:0}"), "ul>li{margin:0}");
    }

    #[test]
    fn test_opaque_retained() {
        assert_eq!(
            critical(&["div"], "!huh! {background: white; } @huh { display: block; }"),
            "!huh! {background:#fff}@huh { display: block; }"
        );
    }

    #[test]
    fn test_media_narrowing() {
        assert_eq!(
            critical(&["*"], "@media screen,print { * { margin: 0px; } }"),
            "@media screen{*{margin:0px}}"
        );
    }

    #[test]
    fn test_media_dropped_without_critical_rules() {
        assert_eq!(critical(&["div"], "@media screen { p { margin: 0 } }"), "");
    }

    #[test]
    fn test_print_only_media_dropped() {
        assert_eq!(critical(&["div"], "@media print { div { margin: 0 } }"), "");
    }

    #[test]
    fn test_media_many_conditions() {
        assert_eq!(
            critical(
                &["div"],
                "@media print, screen and (min-width: 10px), not screen, (orientation: portrait), only screen { div{margin:0} }"
            ),
            "@media screen and (min-width:10px),(orientation:portrait),only screen{div{margin:0}}"
        );
    }

    #[test]
    fn test_supports_prelude_kept() {
        assert_eq!(
            critical(&["div"], "@supports (display: grid) { div { display: grid } p { color: red } }"),
            "@supports (display:grid){div{display:grid}}"
        );
    }

    #[test]
    fn test_nested_grouping() {
        assert_eq!(
            critical(&["div"], "@media screen { @supports (display:grid) { div{display:grid} } }"),
            "@media screen{@supports (display:grid){div{display:grid}}}"
        );
    }

    #[test]
    fn test_statement_at_rules() {
        assert_eq!(
            critical(&[], "@charset \"utf-8\"; @import url(a.css); p{margin:0}"),
            "@import url(a.css);"
        );
    }

    #[test]
    fn test_empty_set_keeps_only_indeterminate() {
        assert_eq!(critical(&[], "div{margin:0}:focus{outline:0}@font-face{src:url(x)}"), ":focus{outline:0}@font-face{src:url(x)}");
    }

    #[test]
    fn test_split_top_level_commas() {
        assert_eq!(split_top_level_commas("a, (b,c) ,d"), vec!["a", "(b,c)", "d"]);
    }

    #[test]
    fn test_narrow_media_list() {
        assert_eq!(narrow_media_list("print"), None);
        assert_eq!(narrow_media_list("ALL"), Some("ALL".to_string()));
        assert_eq!(narrow_media_list(""), Some(String::new()));
        assert_eq!(narrow_media_list("only print"), None);
        assert_eq!(narrow_media_list("not print"), Some("not print".to_string()));
        assert_eq!(narrow_media_list("NOT Screen"), None);
        assert_eq!(narrow_media_list("not all"), None);
        assert_eq!(narrow_media_list("not"), None);
        assert_eq!(narrow_media_list("not print, print"), Some("not print".to_string()));
    }

    #[test]
    fn test_negated_media_queries() {
        assert_eq!(
            critical(&["div"], "@media not print { div { margin: 0 } }"),
            "@media not print{div{margin:0}}"
        );
        assert_eq!(
            critical(&["div"], "@media not print, print { div { margin: 0 } }"),
            "@media not print{div{margin:0}}"
        );
        assert_eq!(
            critical(
                &["div"],
                "@media not all, not screen, not (hover: none), not speech and (color) { div{margin:0} }"
            ),
            "@media not (hover:none),not speech and (color){div{margin:0}}"
        );
        assert_eq!(critical(&["div"], "@media not screen { div { margin: 0 } }"), "");
    }
}
