//! Stylesheet resolution
//!
//! Linked stylesheets are fetched outside the filter; the filter only asks
//! for the text of an already absolute URL.

use foldline_css::{SpannedToken, Token, Tokenizer};
use log::debug;
use rustc_hash::FxHashMap;
use url::Url;

/// Supplies the text of linked stylesheets
pub trait StylesheetResolver {
    /// Stylesheet text, or `None` if it is not available
    fn fetch(&self, url: &Url) -> Option<String>;
}

/// Resolve a `<link href>` against the page URL
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    match base.join(href.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!("Cannot resolve stylesheet href {:?} against {}: {}", href, base, e);
            None
        }
    }
}

/// Rewrite the relative `url()` references in `css` to absolute URLs
/// against `base`, the URL the CSS was loaded from
///
/// Inlined into a page, the references would otherwise resolve against the
/// page URL. Absolute URLs and fragment-only references are left as they
/// are.
pub fn absolutize_urls(css: &str, base: &Url) -> String {
    let tokens = Tokenizer::new(css).tokenize_all();
    let mut out = String::with_capacity(css.len());
    let mut copied = 0;
    let mut i = 0;

    while i < tokens.len() {
        let reference = match &tokens[i].token {
            Token::Url(value) => Some((value.as_str(), i)),
            Token::Function(name) if name.eq_ignore_ascii_case("url") => quoted_url(&tokens, i),
            _ => None,
        };
        let Some((value, last)) = reference else {
            i += 1;
            continue;
        };

        if let Some(absolute) = absolute_reference(base, value) {
            out.push_str(&css[copied..tokens[i].span.start]);
            out.push_str("url(\"");
            out.push_str(absolute.as_str());
            out.push_str("\")");
            copied = tokens[last].span.end;
        }
        i = last + 1;
    }

    out.push_str(&css[copied..]);
    out
}

/// `url( "x" )` written as a function: the string and the index of `)`
fn quoted_url(tokens: &[SpannedToken], function: usize) -> Option<(&str, usize)> {
    let mut args = tokens
        .iter()
        .enumerate()
        .skip(function + 1)
        .filter(|(_, t)| t.token != Token::Whitespace);
    let value = match args.next() {
        Some((_, SpannedToken { token: Token::String(value), .. })) => value.as_str(),
        _ => return None,
    };
    match args.next() {
        Some((close, t)) if t.token == Token::RightParen => Some((value, close)),
        _ => None,
    }
}

fn absolute_reference(base: &Url, value: &str) -> Option<Url> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') || Url::parse(value).is_ok() {
        return None;
    }
    match base.join(value) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!("Cannot resolve CSS reference {:?} against {}: {}", value, base, e);
            None
        }
    }
}

/// Stylesheets held in memory, keyed by absolute URL
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    sheets: FxHashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stylesheet at an absolute URL
    pub fn insert(&mut self, url: &Url, css: impl Into<String>) {
        self.sheets.insert(url.as_str().to_string(), css.into());
    }

    /// Builder-style [`insert`](Self::insert) for a URL given as text
    pub fn with_sheet(mut self, url: &str, css: impl Into<String>) -> Self {
        if let Ok(url) = Url::parse(url) {
            self.insert(&url, css);
        }
        self
    }
}

impl StylesheetResolver for MapResolver {
    fn fetch(&self, url: &Url) -> Option<String> {
        self.sheets.get(url.as_str()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_relative() {
        let base = Url::parse("http://www.example.com/dir/page.html").unwrap();
        assert_eq!(resolve_href(&base, "a.css").unwrap().as_str(), "http://www.example.com/dir/a.css");
        assert_eq!(resolve_href(&base, "/b.css").unwrap().as_str(), "http://www.example.com/b.css");
        assert_eq!(
            resolve_href(&base, "//cdn.example.com/c.css").unwrap().as_str(),
            "http://cdn.example.com/c.css"
        );
    }

    #[test]
    fn test_resolve_invalid() {
        let base = Url::parse("http://www.example.com/").unwrap();
        assert!(resolve_href(&base, "http://[::1").is_none());
    }

    #[test]
    fn test_map_resolver() {
        let resolver = MapResolver::new().with_sheet("http://www.example.com/a.css", "p{}");
        let url = Url::parse("http://www.example.com/a.css").unwrap();
        assert_eq!(resolver.fetch(&url).as_deref(), Some("p{}"));

        let missing = Url::parse("http://www.example.com/b.css").unwrap();
        assert_eq!(resolver.fetch(&missing), None);
    }

    #[test]
    fn test_absolutize_urls() {
        let base = Url::parse("http://www.example.com/css/site.css").unwrap();
        assert_eq!(
            absolutize_urls("a{background:url(bg.png)}", &base),
            "a{background:url(\"http://www.example.com/css/bg.png\")}"
        );
        assert_eq!(
            absolutize_urls("@import url( '../print.css' ) print;b{x:1}", &base),
            "@import url(\"http://www.example.com/print.css\") print;b{x:1}"
        );
        assert_eq!(
            absolutize_urls("a{src:url(/f.woff) format('woff'),url(\"f (1).ttf\")}", &base),
            "a{src:url(\"http://www.example.com/f.woff\") format('woff'),url(\"http://www.example.com/css/f%20(1).ttf\")}"
        );
    }

    #[test]
    fn test_absolutize_leaves_absolute_references() {
        let base = Url::parse("http://www.example.com/css/site.css").unwrap();
        let css = "a{b:url(http://cdn.example.com/x.png);c:url(data:image/gif;base64,R0lGOD);d:url(#clip);e:url()}";
        assert_eq!(absolutize_urls(css, &base), css);
        assert_eq!(absolutize_urls("p{content:'url(x.png)'}", &base), "p{content:'url(x.png)'}");
    }
}
