//! Critical selector filter
//!
//! One rewrite pass over one page: find its stylesheets, compute (or reuse)
//! the critical CSS, and rewrite the markup only when the cache holds a
//! result validated against exactly the current CSS and selector set.

use foldline_css::{close_unterminated, minify_tokens, AtRule, CssDocument, Item, MinifyMode, Tokenizer};
use log::{debug, info};
use url::Url;

use crate::assembler::{HtmlAssembler, PageStyles, StyleSource};
use crate::cache::{css_fingerprint, selector_fingerprint, CacheDecision, CssSource, ResultCache};
use crate::config::FilterConfig;
use crate::resolver::{absolutize_urls, resolve_href, StylesheetResolver};
use crate::selectors::{CriticalSelectorSet, SelectorSetSource};
use crate::splitter::SelectorSplitter;
use crate::store::{PropertyKey, PropertyStore};

/// Why a page was left untouched without consulting the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoStylesheets,
    /// A linked stylesheet could not be resolved or fetched
    UnresolvedStylesheet(String),
}

/// What a rewrite pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteStatus {
    /// Critical CSS inlined from a matching cache entry
    Rewritten { critical_bytes: usize, replaced_nodes: usize },
    /// Critical CSS computed and stored; shown from the next pass
    Deferred,
    /// The store failed; computed but neither stored nor shown
    NotCacheable,
    Skipped(SkipReason),
}

/// Result of one rewrite pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub html: String,
    pub status: RewriteStatus,
}

impl RewriteOutcome {
    fn unchanged(html: &str, status: RewriteStatus) -> Self {
        Self {
            html: html.to_string(),
            status,
        }
    }

    pub fn is_rewritten(&self) -> bool {
        matches!(self.status, RewriteStatus::Rewritten { .. })
    }
}

/// Critical CSS filter for a single rewrite pass
pub struct CriticalSelectorFilter<'a> {
    config: &'a FilterConfig,
    store: &'a dyn PropertyStore,
    selectors: &'a dyn SelectorSetSource,
    resolver: &'a dyn StylesheetResolver,
}

impl<'a> CriticalSelectorFilter<'a> {
    pub fn new(
        config: &'a FilterConfig,
        store: &'a dyn PropertyStore,
        selectors: &'a dyn SelectorSetSource,
        resolver: &'a dyn StylesheetResolver,
    ) -> Self {
        Self {
            config,
            store,
            selectors,
            resolver,
        }
    }

    /// Run the pass over `html`, served at `page_url`
    pub fn rewrite(self, page_url: &Url, html: &str) -> RewriteOutcome {
        let styles = PageStyles::discover(html);
        if styles.is_empty() {
            debug!("No stylesheets in {}", page_url);
            return RewriteOutcome::unchanged(html, RewriteStatus::Skipped(SkipReason::NoStylesheets));
        }

        let sources = match self.collect_sources(page_url, &styles) {
            Ok(sources) => sources,
            Err(href) => {
                info!("Leaving {} untouched: cannot load stylesheet {:?}", page_url, href);
                return RewriteOutcome::unchanged(html, RewriteStatus::Skipped(SkipReason::UnresolvedStylesheet(href)));
            }
        };

        let page = page_url.as_str();
        let set = self
            .selectors
            .critical_selectors(page, &self.config.beacon_cohort)
            .unwrap_or_default();

        let key = PropertyKey::new(page, &self.config.dom_cohort, &self.config.summary_property);
        let cache = ResultCache::new(self.store, key);
        let decision = cache.resolve(&css_fingerprint(&sources), &selector_fingerprint(&set), || {
            compute_critical_css(&sources, &set)
        });

        match decision {
            CacheDecision::Show(critical_css) => {
                let rewritten = HtmlAssembler::new(self.config).assemble(html, &styles, &critical_css);
                info!(
                    "Inlined {} bytes of critical CSS into {}, deferring {} stylesheet(s)",
                    critical_css.len(),
                    page_url,
                    styles.len()
                );
                RewriteOutcome {
                    html: rewritten,
                    status: RewriteStatus::Rewritten {
                        critical_bytes: critical_css.len(),
                        replaced_nodes: styles.len(),
                    },
                }
            }
            CacheDecision::Stored(_) => {
                debug!("Critical CSS for {} stored, shown from the next request", page_url);
                RewriteOutcome::unchanged(html, RewriteStatus::Deferred)
            }
            CacheDecision::NotCacheable(_) => RewriteOutcome::unchanged(html, RewriteStatus::NotCacheable),
        }
    }

    /// CSS text of every style node, in order; `Err(href)` for the first
    /// linked sheet that cannot be loaded
    fn collect_sources(&self, page_url: &Url, styles: &PageStyles) -> Result<Vec<CssSource>, String> {
        styles
            .nodes
            .iter()
            .map(|node| -> Result<CssSource, String> {
                match &node.source {
                    StyleSource::Inline(css) => Ok(CssSource::with_media(css.clone(), node.media.clone())),
                    StyleSource::Link(href) => {
                        let url = resolve_href(page_url, href).ok_or_else(|| href.clone())?;
                        let css = self.resolver.fetch(&url).ok_or_else(|| href.clone())?;
                        Ok(CssSource::with_media(css, node.media.clone()).with_base(url))
                    }
                }
            })
            .collect()
    }
}

/// Critical CSS of all sources, concatenated in document order
///
/// Each source's part is closed off before the next is appended, and
/// relative references in linked sheets are made absolute.
pub fn compute_critical_css(sources: &[CssSource], set: &CriticalSelectorSet) -> String {
    let splitter = SelectorSplitter::new(set);
    let mut critical = String::new();
    for source in sources {
        let document = CssDocument::parse(&source.css);
        let document = match &source.media {
            Some(media) => wrap_in_media(document, media),
            None => document,
        };
        let css = splitter.critical_css(&document);
        let css = match &source.base {
            Some(base) => absolutize_urls(&css, base),
            None => css,
        };
        critical.push_str(&close_unterminated(&css));
    }
    critical
}

/// `@media <media>{document}`, as if the source had been written that way
fn wrap_in_media(document: CssDocument, media: &str) -> CssDocument {
    let tokens = Tokenizer::new(media).tokenize_all();
    CssDocument {
        items: vec![Item::AtRule(AtRule {
            keyword: "media".to_string(),
            prelude: minify_tokens(&tokens, media, MinifyMode::Prelude),
            nested: Some(document),
        })],
    }
}
