//! HTML assembler
//!
//! Finds the style-bearing nodes of a page and, once critical CSS may be
//! shown, splices the page: the first node becomes one inline `<style>`,
//! the rest disappear, and their original markup moves into a `<noscript>`
//! wrapper that the bootstrap script activates after `load`.

use std::ops::Range;

use foldline_css::escape_for_style_element;
use foldline_html::{SpannedToken, Token, Tokenizer};
use log::debug;

use crate::config::FilterConfig;
use crate::scripts::{bootstrap_script, BootstrapScript};

/// Where a style-bearing node gets its CSS from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleSource {
    /// `<style>` element content
    Inline(String),
    /// `<link rel=stylesheet>` target, as written
    Link(String),
}

/// A node whose CSS is folded into the critical CSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleNode {
    pub source: StyleSource,
    /// `media` attribute, unless empty or `all`
    pub media: Option<String>,
    /// Byte range of the node's full markup
    pub span: Range<usize>,
}

/// The style-bearing nodes of a page, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStyles {
    pub nodes: Vec<StyleNode>,
    /// Start of the last `</html>` tag
    html_end: Option<usize>,
}

impl PageStyles {
    /// Scan `html` for stylesheets outside `<noscript>`
    pub fn discover(html: &str) -> Self {
        let tokens = Tokenizer::new(html).tokenize_all();
        let mut styles = PageStyles::default();
        let mut noscript_depth = 0usize;
        let mut i = 0;

        while i < tokens.len() {
            let spanned = &tokens[i];
            match &spanned.token {
                Token::StartTag { name, self_closing, .. } if name == "noscript" => {
                    if !self_closing {
                        noscript_depth += 1;
                    }
                }
                Token::EndTag { name } if name == "noscript" => {
                    noscript_depth = noscript_depth.saturating_sub(1);
                }
                Token::EndTag { name } if name == "html" => {
                    styles.html_end = Some(spanned.span.start);
                }
                Token::StartTag { name, .. } if noscript_depth == 0 && name == "link" => {
                    let token = &spanned.token;
                    if let Some(href) = stylesheet_href(token) {
                        styles.nodes.push(StyleNode {
                            source: StyleSource::Link(href.to_string()),
                            media: media_of(token),
                            span: spanned.span.clone(),
                        });
                    }
                }
                Token::StartTag { name, .. } if noscript_depth == 0 && name == "style" => {
                    if let Some((node, last)) = style_element(&tokens, i, &spanned.token) {
                        styles.nodes.push(node);
                        i = last;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        styles
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// `href` of a `<link>` that loads a (non-alternate) stylesheet
fn stylesheet_href(token: &Token) -> Option<&str> {
    let rel = token.attribute("rel")?;
    let mut is_stylesheet = false;
    for word in rel.split_ascii_whitespace() {
        if word.eq_ignore_ascii_case("alternate") {
            return None;
        }
        if word.eq_ignore_ascii_case("stylesheet") {
            is_stylesheet = true;
        }
    }
    let href = token.attribute("href")?.trim();
    (is_stylesheet && !href.is_empty()).then_some(href)
}

fn media_of(token: &Token) -> Option<String> {
    let media = token.attribute("media")?.trim();
    if media.is_empty() || media.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(media.to_string())
    }
}

/// A `<style>` element starting at `tokens[start]`, with the index of its
/// end tag. Unterminated or non-CSS style elements are left alone.
fn style_element(tokens: &[SpannedToken], start: usize, token: &Token) -> Option<(StyleNode, usize)> {
    if let Some(kind) = token.attribute("type") {
        let kind = kind.trim();
        if !kind.is_empty() && !kind.eq_ignore_ascii_case("text/css") {
            return None;
        }
    }

    let (css, end) = match tokens.get(start + 1).map(|t| &t.token) {
        Some(Token::Text(css)) => (css.clone(), start + 2),
        _ => (String::new(), start + 1),
    };
    let close = tokens.get(end)?;
    if !close.token.is_end_tag("style") {
        debug!("Ignoring unterminated <style> at byte {}", tokens[start].span.start);
        return None;
    }

    let node = StyleNode {
        source: StyleSource::Inline(css),
        media: media_of(token),
        span: tokens[start].span.start..close.span.end,
    };
    Some((node, end))
}

/// Rewrites a page around its critical CSS
pub struct HtmlAssembler<'a> {
    config: &'a FilterConfig,
}

impl<'a> HtmlAssembler<'a> {
    pub fn new(config: &'a FilterConfig) -> Self {
        Self { config }
    }

    /// The page with its style nodes replaced by `critical_css` and the
    /// deferred-styles block
    pub fn assemble(&self, html: &str, styles: &PageStyles, critical_css: &str) -> String {
        let mut out = String::with_capacity(html.len() + critical_css.len() + 1024);
        let mut cursor = 0;

        for (index, node) in styles.nodes.iter().enumerate() {
            out.push_str(&html[cursor..node.span.start]);
            if index == 0 {
                out.push_str("<style>");
                out.push_str(&escape_for_style_element(critical_css));
                out.push_str("</style>");
            }
            cursor = node.span.end;
        }

        let insert_at = styles
            .html_end
            .filter(|&pos| pos >= cursor)
            .unwrap_or(html.len());
        out.push_str(&html[cursor..insert_at]);
        self.push_deferred_block(&mut out, html, styles);
        out.push_str(&html[insert_at..]);
        out
    }

    fn push_deferred_block(&self, out: &mut String, html: &str, styles: &PageStyles) {
        out.push_str("<noscript id=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(&self.config.deferred_styles_id));
        out.push_str("\">");
        for node in &styles.nodes {
            out.push_str(&html[node.span.clone()]);
        }
        out.push_str("</noscript><script type=\"text/javascript\">");
        out.push_str(bootstrap_script(BootstrapScript::DeferredStyles, self.config.script_variant));
        out.push_str("</script>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn script() -> &'static str {
        bootstrap_script(BootstrapScript::DeferredStyles, Default::default())
    }

    #[test]
    fn test_discover_style_and_links() {
        let html = "<head><style>p{}</style><link rel=\"stylesheet\" href=\"a.css\" media=\"print\">\
                    <link rel=\"icon\" href=\"i.png\"><link rel=\"alternate stylesheet\" href=\"alt.css\"></head>";
        let styles = PageStyles::discover(html);
        assert_eq!(styles.len(), 2);
        assert_eq!(styles.nodes[0].source, StyleSource::Inline("p{}".into()));
        assert_eq!(&html[styles.nodes[0].span.clone()], "<style>p{}</style>");
        assert_eq!(styles.nodes[1].source, StyleSource::Link("a.css".into()));
        assert_eq!(styles.nodes[1].media.as_deref(), Some("print"));
    }

    #[test]
    fn test_discover_rel_case_and_tokens() {
        let styles = PageStyles::discover("<LINK REL=\"preload StyleSheet\" HREF=\" b.css \">");
        assert_eq!(styles.nodes[0].source, StyleSource::Link("b.css".into()));
    }

    #[test]
    fn test_discover_skips_noscript_and_other_types() {
        let html = "<noscript><link rel=stylesheet href=n.css><style>a{}</style></noscript>\
                    <style type=\"text/less\">@x: 1;</style><style media=\"all\" type=\"TEXT/CSS\">b{}</style>\
                    <link rel=stylesheet href=\"\">";
        let styles = PageStyles::discover(html);
        assert_eq!(styles.len(), 1);
        assert_eq!(styles.nodes[0].source, StyleSource::Inline("b{}".into()));
        assert_eq!(styles.nodes[0].media, None);
    }

    #[test]
    fn test_discover_empty_and_unterminated_style() {
        let styles = PageStyles::discover("<style></style><style>p{}");
        assert_eq!(styles.len(), 1);
        assert_eq!(styles.nodes[0].source, StyleSource::Inline(String::new()));
    }

    #[test]
    fn test_assemble_replaces_nodes() {
        let html = "<html><head><style>p{}</style><link rel=stylesheet href=a.css></head><body></body></html>";
        let styles = PageStyles::discover(html);
        let config = FilterConfig::default();
        let out = HtmlAssembler::new(&config).assemble(html, &styles, "p{margin:0}");
        assert_eq!(
            out,
            format!(
                "<html><head><style>p{{margin:0}}</style></head><body></body>\
                 <noscript id=\"fl_deferred_styles\"><style>p{{}}</style><link rel=stylesheet href=a.css></noscript>\
                 <script type=\"text/javascript\">{}</script></html>",
                script()
            )
        );
    }

    #[test]
    fn test_assemble_without_html_end() {
        let html = "<link rel=stylesheet href=a.css><p>x</p>";
        let styles = PageStyles::discover(html);
        let config = FilterConfig::default();
        let out = HtmlAssembler::new(&config).assemble(html, &styles, "");
        assert!(out.starts_with("<style></style><p>x</p><noscript id=\"fl_deferred_styles\">"));
        assert!(out.ends_with("</script>"));
    }

    #[test]
    fn test_assemble_escapes() {
        let html = "<style>x</style>";
        let styles = PageStyles::discover(html);
        let config = FilterConfig {
            deferred_styles_id: "a\"b".to_string(),
            ..FilterConfig::default()
        };
        let out = HtmlAssembler::new(&config).assemble(html, &styles, "p{content:'</style>'}");
        assert!(out.starts_with("<style>p{content:'<\\/style>'}</style><noscript id=\"a&quot;b\">"));
    }
}
