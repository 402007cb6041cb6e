//! Discovery pipeline: sitemap recursion and in-page link extraction, the
//! two sources that feed new tasks into a running job.

pub mod links;
pub mod sitemap;

pub use links::{extract as extract_links, ExtractedLinks};
pub use sitemap::discover as discover_sitemap;

/// Reduce an absolute URL (as returned by the Sitemap Discoverer) to the
/// page path `enqueue_pages` expects, query string included.
#[must_use]
pub fn path_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    Some(match parsed.query() {
        Some(q) => format!("{}?{q}", parsed.path()),
        None => parsed.path().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_of_strips_scheme_and_host() {
        assert_eq!(path_of("https://example.test/a/b?x=1").as_deref(), Some("/a/b?x=1"));
        assert_eq!(path_of("not a url"), None);
    }
}
