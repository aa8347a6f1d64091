//! URL handling for the remote listing
//!
//! Builds per-page listing URLs and turns the detail-view hrefs found in
//! table rows into absolute links.

use url::Url;

/// Builds the URL for a listing page
///
/// Page 1 is the bare listing endpoint. Every other page appends the page
/// number as a query parameter, preserving any query the endpoint already has.
///
/// # Examples
///
/// ```
/// use property_harvest::url::page_url;
/// use url::Url;
///
/// let listing = Url::parse("https://registry.example.org/list").unwrap();
/// assert_eq!(page_url(&listing, "page", 1).as_str(), "https://registry.example.org/list");
/// assert_eq!(page_url(&listing, "page", 7).as_str(), "https://registry.example.org/list?page=7");
/// ```
pub fn page_url(listing: &Url, page_param: &str, page: u32) -> Url {
    let mut url = listing.clone();
    if page > 1 {
        url.query_pairs_mut()
            .append_pair(page_param, &page.to_string());
    }
    url
}

/// Resolves a detail-view href against the site origin
///
/// Absolute hrefs are kept as-is. Anything else is appended to the origin,
/// so `/view?id=1` on `https://site.example` becomes
/// `https://site.example/view?id=1`. A blank href resolves to an empty string.
pub fn resolve_detail_link(site_origin: &str, href: &str) -> String {
    let href = href.trim();

    if href.is_empty() {
        return String::new();
    }

    if let Ok(absolute) = Url::parse(href) {
        if absolute.scheme() == "http" || absolute.scheme() == "https" {
            return absolute.to_string();
        }
    }

    let origin = site_origin.trim_end_matches('/');
    if href.starts_with('/') {
        format!("{}{}", origin, href)
    } else {
        format!("{}/{}", origin, href)
    }
}
