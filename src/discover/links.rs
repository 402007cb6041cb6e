//! Link Extractor: pulls same-domain anchor hrefs (fed back into the task
//! pipeline) and document links (recorded only) out of an HTML page body.

use scraper::{Html, Selector};
use url::Url;

const MAX_QUERY_BYTES: usize = 2 * 1024;
const MAX_EMISSIONS: usize = 1000;
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

#[derive(Debug, Default, Clone)]
pub struct ExtractedLinks {
    /// Same-domain page paths (e.g. `/about`), to enqueue as new tasks.
    pub pages: Vec<String>,
    /// Same-domain document URLs, recorded but not enqueued.
    pub documents: Vec<String>,
}

/// Extract links from `body` (the HTML of `page_url`), resolving relative
/// hrefs against `page_url` (or a `<base href>` if present) and keeping
/// only links that stay on `domain`.
#[must_use]
pub fn extract(body: &str, page_url: &str, domain: &str) -> ExtractedLinks {
    let Ok(page) = Url::parse(page_url) else {
        return ExtractedLinks::default();
    };

    let document = Html::parse_document(body);
    let base = base_href(&document, &page).unwrap_or(page);

    let anchor_selector = Selector::parse("a[href]").expect("static selector is valid");
    let mut result = ExtractedLinks::default();
    let mut emitted = 0usize;

    for element in document.select(&anchor_selector) {
        if emitted >= MAX_EMISSIONS {
            break;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if should_skip(href) {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !resolved.host_str().is_some_and(|h| h.eq_ignore_ascii_case(domain)) {
            continue;
        }
        if resolved.query().is_some_and(|q| q.len() > MAX_QUERY_BYTES) {
            continue;
        }

        let mut resolved = resolved;
        resolved.set_fragment(None);
        let path_and_query = path_with_query(&resolved);

        if is_document(&resolved) {
            result.documents.push(resolved.to_string());
        } else {
            result.pages.push(path_and_query);
        }
        emitted += 1;
    }

    result
}

fn base_href(document: &Html, page_url: &Url) -> Option<Url> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    page_url.join(href).ok()
}

fn should_skip(href: &str) -> bool {
    let lower = href.trim().to_lowercase();
    lower.is_empty()
        || lower.starts_with("mailto:")
        || lower.starts_with("javascript:")
        || lower.starts_with("tel:")
        || lower.starts_with('#')
}

fn is_document(url: &Url) -> bool {
    url.path()
        .rsplit('.')
        .next()
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn path_with_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_same_domain_links_only() {
        let html = r#"
            <html><body>
                <a href="/about">About</a>
                <a href="https://example.com/contact">Contact</a>
                <a href="https://other.com/page">External</a>
            </body></html>
        "#;
        let links = extract(html, "https://example.com/", "example.com");
        assert_eq!(links.pages, vec!["/about", "/contact"]);
    }

    #[test]
    fn skips_non_http_schemes_and_fragments() {
        let html = r#"
            <a href="mailto:a@example.com">mail</a>
            <a href="javascript:void(0)">js</a>
            <a href="tel:+123">tel</a>
            <a href="#top">frag</a>
        "#;
        let links = extract(html, "https://example.com/", "example.com");
        assert!(links.pages.is_empty());
    }

    #[test]
    fn separates_documents_from_pages() {
        let html = r#"<a href="/report.pdf">PDF</a><a href="/index">Index</a>"#;
        let links = extract(html, "https://example.com/", "example.com");
        assert_eq!(links.pages, vec!["/index"]);
        assert_eq!(links.documents, vec!["https://example.com/report.pdf"]);
    }

    #[test]
    fn resolves_against_base_href() {
        let html = r#"<base href="https://example.com/blog/"><a href="post-1">Post</a>"#;
        let links = extract(html, "https://example.com/", "example.com");
        assert_eq!(links.pages, vec!["/blog/post-1"]);
    }
}
