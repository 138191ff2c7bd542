//! Pagination expander
//!
//! Paginated API responses carry a top-level `links` array of `{rel, href}`
//! objects. From the first page's `self` and `last` links the expander
//! computes every remaining page URL at once, so pages are fetched in
//! parallel instead of by walking `next`.

use crate::PaginationError;
use serde_json::Value;
use url::Url;

/// Navigation links of a payload, keyed by relation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationLinks {
    pub self_url: Option<String>,
    pub next: Option<String>,
    pub last: Option<String>,
}

impl PaginationLinks {
    /// Reads the `links` array of a JSON payload
    ///
    /// Entries without a string `rel` or `href` are ignored. When a relation
    /// repeats, the last entry wins.
    pub fn from_payload(payload: &Value) -> Self {
        let mut links = Self::default();

        let Some(entries) = payload.get("links").and_then(Value::as_array) else {
            return links;
        };

        for entry in entries {
            let rel = entry.get("rel").and_then(Value::as_str);
            let href = entry.get("href").and_then(Value::as_str);
            let (Some(rel), Some(href)) = (rel, href) else {
                continue;
            };
            let slot = match rel {
                "self" => &mut links.self_url,
                "next" => &mut links.next,
                "last" => &mut links.last,
                _ => continue,
            };
            *slot = Some(href.to_string());
        }

        links
    }
}

/// Computes the follow-up pages of a payload
///
/// Returns an empty list when the payload lacks a `self` or `last` link.
pub fn expand_payload(payload: &Value, page_parameter: &str) -> Result<Vec<String>, PaginationError> {
    let links = PaginationLinks::from_payload(payload);
    match (links.self_url, links.last) {
        (Some(self_url), Some(last)) => expand(&self_url, &last, page_parameter),
        _ => Ok(Vec::new()),
    }
}

/// Generates the URLs of pages 2 through the last page
///
/// Only the first page expands: when `self_url` points past page 1 the
/// result is empty, whatever `last_url` says. Each generated URL is
/// `self_url` with its page parameter overwritten (or appended when absent).
///
/// # Errors
///
/// Returns `PaginationError` if either link is not an absolute URL or its
/// page parameter is not a non-negative integer.
pub fn expand(
    self_url: &str,
    last_url: &str,
    page_parameter: &str,
) -> Result<Vec<String>, PaginationError> {
    let current = parse_link(self_url)?;
    if page_number(&current, page_parameter)? > 1 {
        return Ok(Vec::new());
    }

    let last = parse_link(last_url)?;
    let last_page = page_number(&last, page_parameter)?;

    Ok((2..=last_page)
        .map(|page| with_page(&current, page_parameter, page))
        .collect())
}

fn parse_link(href: &str) -> Result<Url, PaginationError> {
    Url::parse(href).map_err(|source| PaginationError::InvalidLink {
        url: href.to_string(),
        source,
    })
}

/// Reads the page number of a link; a link without the parameter is page 1
fn page_number(url: &Url, page_parameter: &str) -> Result<u64, PaginationError> {
    let value = url
        .query_pairs()
        .find(|(key, _)| key == page_parameter)
        .map(|(_, value)| value.into_owned());

    match value {
        None => Ok(1),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| PaginationError::InvalidPageNumber {
                url: url.to_string(),
                param: page_parameter.to_string(),
                value,
            }),
    }
}

/// Rewrites the page parameter, keeping every other query pair verbatim
fn with_page(url: &Url, page_parameter: &str, page: u64) -> String {
    let replacement = format!("{}={}", page_parameter, page);
    let mut replaced = false;

    let mut pairs: Vec<String> = url
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            if key == page_parameter {
                replaced = true;
                replacement.clone()
            } else {
                pair.to_string()
            }
        })
        .collect();

    if !replaced {
        pairs.push(replacement);
    }

    let mut page_url = url.clone();
    page_url.set_query(Some(&pairs.join("&")));
    page_url.to_string()
}
