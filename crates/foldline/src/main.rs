//! Foldline - critical CSS inliner
//!
//! Usage: foldline <COMMAND> ...

mod files;

use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use log::info;
use url::Url;

use foldline_css::CssDocument;
use foldline_critical::{
    split_top_level_commas, write_critical_selectors, CriticalSelectorFilter, CriticalSelectorSet, FilterConfig,
    RewriteStatus, SelectorSetSource, SelectorSplitter, StaticSelectorSource, StoredSelectorSource,
};

use crate::files::{FileResolver, JsonFileStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("foldline");

    if args.len() < 2 {
        print_usage(program);
        return ExitCode::FAILURE;
    }

    let result = match args[1].as_str() {
        "--help" | "-h" => {
            print_usage(program);
            return ExitCode::SUCCESS;
        }
        "--version" | "-V" => {
            println!("Foldline {}", VERSION);
            return ExitCode::SUCCESS;
        }
        "split" => run_split(&args[2..]),
        "rewrite" => run_rewrite(&args[2..]),
        "record" => run_record(&args[2..]),
        other => Err(format!("Unknown command '{}' (try --help)", other)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage(program: &str) {
    println!(
        r#"Foldline {} - inline critical CSS, defer the rest

USAGE:
    {} <COMMAND> [OPTIONS]

COMMANDS:
    split <CSS-FILE> --selectors <LIST>
        Print the critical subset of a stylesheet
    rewrite <HTML-FILE> --store <JSON> [--url <URL>] [--root <DIR>]
            [--selectors <LIST>|stored] [--config <JSON>]
        Run one rewrite pass and print the resulting page
    record <URL> --store <JSON> --selectors <LIST> [--config <JSON>]
        Save the critical selectors for a page

OPTIONS:
    -h, --help        Print this help message
    -V, --version     Print version information

The first rewrite of a page stores its critical CSS; the page is rewritten
from the next run on, while stylesheets and selectors stay the same.

EXAMPLES:
    {} split site.css --selectors "body,.header,h1"
    {} record https://example.com/ --store props.json --selectors "div,*"
    {} rewrite index.html --url https://example.com/ --root . --store props.json

"#,
        VERSION, program, program, program, program
    );
}

/// Value following `--name` in `args`
fn option<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument that is neither an option nor an option's value
fn positional(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            return Some(arg);
        }
    }
    None
}

fn parse_selector_list(list: &str) -> Vec<String> {
    split_top_level_commas(list)
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn load_config(args: &[String]) -> Result<FilterConfig, String> {
    match option(args, "--config") {
        Some(path) => FilterConfig::from_json_file(path).map_err(|e| format!("{}: {}", path, e)),
        None => Ok(FilterConfig::default()),
    }
}

fn open_store(args: &[String]) -> Result<JsonFileStore, String> {
    let path = option(args, "--store").ok_or("--store <JSON> is required")?;
    JsonFileStore::open(path).map_err(|e| format!("Failed to open store {}: {}", path, e))
}

/// Print the critical CSS of one stylesheet
fn run_split(args: &[String]) -> Result<(), String> {
    let path = positional(args).ok_or("split needs a CSS file")?;
    let selectors = option(args, "--selectors").ok_or("--selectors <LIST> is required")?;

    let css = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
    let set = CriticalSelectorSet::new(parse_selector_list(selectors), 0);
    let document = CssDocument::parse(&css);

    println!("{}", SelectorSplitter::new(&set).critical_css(&document));
    Ok(())
}

/// Run one rewrite pass over a local HTML file
fn run_rewrite(args: &[String]) -> Result<(), String> {
    let path = Path::new(positional(args).ok_or("rewrite needs an HTML file")?);
    let html = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let config = load_config(args)?;
    let store = open_store(args)?;

    let page_url = match option(args, "--url") {
        Some(url) => Url::parse(url).map_err(|e| format!("Invalid URL {}: {}", url, e))?,
        None => {
            let absolute = fs::canonicalize(path).map_err(|e| format!("{}: {}", path.display(), e))?;
            Url::from_file_path(&absolute).map_err(|_| format!("Cannot make a URL for {}", absolute.display()))?
        }
    };

    let root = option(args, "--root")
        .map(Path::new)
        .or_else(|| path.parent())
        .unwrap_or_else(|| Path::new("."));
    let resolver = FileResolver::with_site_root(&page_url, root);

    let fixed;
    let stored;
    let selectors: &dyn SelectorSetSource = match option(args, "--selectors") {
        None | Some("stored") => {
            stored = StoredSelectorSource::new(&store, &config);
            &stored
        }
        Some(list) => {
            fixed = StaticSelectorSource::new(parse_selector_list(list));
            &fixed
        }
    };

    let outcome = CriticalSelectorFilter::new(&config, &store, selectors, &resolver).rewrite(&page_url, &html);
    match &outcome.status {
        RewriteStatus::Rewritten {
            critical_bytes,
            replaced_nodes,
        } => info!(
            "Rewritten: {} bytes of critical CSS replace {} stylesheet node(s)",
            critical_bytes, replaced_nodes
        ),
        RewriteStatus::Deferred => info!("Critical CSS stored in {}; run again to rewrite", store.path().display()),
        RewriteStatus::NotCacheable => info!("Store unavailable; page left unchanged"),
        RewriteStatus::Skipped(reason) => info!("Skipped: {:?}", reason),
    }

    print!("{}", outcome.html);
    Ok(())
}

/// Save a critical selector set for a page
fn run_record(args: &[String]) -> Result<(), String> {
    let page = positional(args).ok_or("record needs a page URL")?;
    let page_url = Url::parse(page).map_err(|e| format!("Invalid URL {}: {}", page, e))?;
    let selectors = option(args, "--selectors").ok_or("--selectors <LIST> is required")?;
    let config = load_config(args)?;
    let store = open_store(args)?;

    let set = write_critical_selectors(&store, &config, page_url.as_str(), parse_selector_list(selectors))
        .map_err(|e| format!("Failed to record selectors: {}", e))?;
    info!(
        "Recorded {} critical selector(s) for {} (signature {})",
        set.len(),
        page_url,
        set.signature()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_option_and_positional() {
        let a = args(&["--store", "s.json", "page.html", "--url", "http://x/"]);
        assert_eq!(option(&a, "--store"), Some("s.json"));
        assert_eq!(option(&a, "--url"), Some("http://x/"));
        assert_eq!(option(&a, "--config"), None);
        assert_eq!(positional(&a), Some("page.html"));
        assert_eq!(positional(&args(&["--store", "s.json"])), None);
    }

    #[test]
    fn test_parse_selector_list() {
        assert_eq!(
            parse_selector_list("div, *,:is(a,b) ,,"),
            vec!["div".to_string(), "*".to_string(), ":is(a,b)".to_string()]
        );
    }
}
