//! Foldline Critical CSS Filter
//!
//! Inlines the CSS rules a page needs for its first render and defers the
//! rest until after `load`.

mod assembler;
mod cache;
mod config;
mod error;
mod filter;
mod resolver;
mod scripts;
mod selectors;
mod splitter;
mod store;

pub use assembler::{HtmlAssembler, PageStyles, StyleNode, StyleSource};
pub use cache::{
    css_fingerprint, fingerprint, selector_fingerprint, CacheDecision, CacheEntry, CssSource, ResultCache,
};
pub use config::{FilterConfig, ScriptVariant};
pub use error::{FilterError, FilterResult, StoreError, StoreResult};
pub use filter::{compute_critical_css, CriticalSelectorFilter, RewriteOutcome, RewriteStatus, SkipReason};
pub use resolver::{resolve_href, MapResolver, StylesheetResolver};
pub use scripts::{bootstrap_script, BootstrapScript};
pub use selectors::{
    write_critical_selectors, CriticalSelectorSet, SelectorSetSource, StaticSelectorSource, StoredSelectorSource,
};
pub use splitter::{narrow_media_list, split_top_level_commas, SelectorSplitter};
pub use store::{MemoryStore, PropertyKey, PropertyStore};
