//! Assembly of the batch URL list from arguments, an input file, a JSON
//! listing endpoint, and/or stdin.

use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::cli::Args;

/// One entry of a JSON directory listing.
#[derive(Debug, Deserialize)]
struct ListingEntry {
    /// Bare file name.
    entry: Option<String>,
    /// Absolute path on the listing host.
    path: Option<String>,
}

/// Collects URLs in order: positional, input file, listing.
///
/// Stdin is read only when none of those sources were given and it is not
/// a terminal.
pub(crate) async fn collect_urls(args: &Args, client: &reqwest::Client) -> Result<Vec<String>> {
    let mut urls = args.urls.clone();

    if let Some(path) = &args.input_file {
        urls.extend(read_input_file(path)?);
    }

    if let Some(listing_url) = &args.listing_url {
        let discovered = discover_listing(client, listing_url, &args.suffix).await?;
        info!(
            listing = %listing_url,
            suffix = %args.suffix,
            found = discovered.len(),
            "discovered files from listing"
        );
        urls.extend(discovered);
    }

    let explicit_source = !args.urls.is_empty()
        || args.input_file.is_some()
        || args.listing_url.is_some();
    if !explicit_source && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read URLs from stdin")?;
        urls.extend(parse_url_lines(&buffer));
    }

    debug!(count = urls.len(), "collected input URLs");
    Ok(urls)
}

/// Splits text into URLs, one per line; blank lines and `#` comments are skipped.
pub(crate) fn parse_url_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub(crate) fn read_input_file(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    Ok(parse_url_lines(&text))
}

/// Fetches a JSON listing and returns absolute URLs for entries ending in `suffix`.
///
/// Each entry's `path` is resolved against the listing URL's origin.
pub(crate) async fn discover_listing(
    client: &reqwest::Client,
    listing_url: &str,
    suffix: &str,
) -> Result<Vec<String>> {
    let base = Url::parse(listing_url)
        .with_context(|| format!("invalid listing URL {listing_url}"))?;

    let body = client
        .get(base.clone())
        .header(ACCEPT, "application/json")
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("failed to fetch listing {listing_url}"))?
        .bytes()
        .await
        .with_context(|| format!("failed to read listing {listing_url}"))?;

    let entries: Vec<ListingEntry> = serde_json::from_slice(&body)
        .with_context(|| format!("listing {listing_url} is not a JSON array of entries"))?;

    let mut urls = Vec::new();
    for item in entries {
        let (Some(entry), Some(path)) = (item.entry, item.path) else {
            continue;
        };
        if !entry.ends_with(suffix) {
            continue;
        }
        let resolved = base
            .join(&path)
            .with_context(|| format!("listing entry has unusable path {path}"))?;
        urls.push(resolved.to_string());
    }
    Ok(urls)
}
