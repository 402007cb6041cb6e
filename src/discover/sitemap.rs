//! Sitemap Discoverer: fetches `/sitemap.xml`, recurses into sitemap
//! indexes up to depth 3, and falls back to a plain-text URL list when no
//! `<loc>` tag is present.

use crate::engine::{with_timeout, DiscoveryError};
use quick_xml::events::Event;
use reqwest::Client;
use std::collections::HashSet;
use url::Url;

const MAX_RECURSION_DEPTH: u8 = 3;
const SITEMAP_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SitemapFormat {
    Xml,
    PlainText,
}

impl SitemapFormat {
    fn detect(text: &str) -> Self {
        if text.contains("<loc>") {
            Self::Xml
        } else {
            Self::PlainText
        }
    }
}

fn extract_from_xml(text: &str) -> Vec<String> {
    let mut reader = quick_xml::Reader::from_str(text);
    let mut urls = Vec::new();
    let mut buf = Vec::new();
    let mut in_loc_tag = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"loc" => in_loc_tag = true,
            Ok(Event::Text(e)) if in_loc_tag => {
                if let Ok(txt) = e.decode() {
                    urls.push(txt.to_string());
                }
                in_loc_tag = false;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    urls
}

fn extract_from_plain_text(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|token| Url::parse(token).ok())
        .map(|url| url.to_string())
        .collect()
}

fn looks_like_sitemap(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.ends_with(".xml") && lower.contains("sitemap")
}

/// Discover every page URL on `domain` confined to that domain, recursing
/// through sitemap indexes. Errors fetching or parsing are non-fatal: the
/// caller gets back whatever was collected before the failure.
pub async fn discover(client: &Client, domain: &str) -> (Vec<String>, Option<DiscoveryError>) {
    discover_from(client, domain, &format!("https://{domain}/sitemap.xml")).await
}

/// Same as [`discover`] but with an explicit root sitemap URL, so tests can
/// point at a mock server using a scheme/port the production entry point
/// never needs.
async fn discover_from(
    client: &Client,
    domain: &str,
    root: &str,
) -> (Vec<String>, Option<DiscoveryError>) {
    let root = root.to_string();
    let mut seen_sitemaps = HashSet::new();
    let mut pages = Vec::new();
    let mut last_error = None;

    let mut queue = vec![(root, 0u8)];
    while let Some((sitemap_url, depth)) = queue.pop() {
        if !seen_sitemaps.insert(sitemap_url.clone()) {
            continue;
        }

        let text = match with_timeout(
            async {
                let resp = client.get(&sitemap_url).send().await?;
                Ok(resp.text().await?)
            },
            SITEMAP_FETCH_TIMEOUT_SECS,
            "sitemap fetch",
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                last_error = Some(match e.downcast::<reqwest::Error>() {
                    Ok(reqwest_err) => DiscoveryError::Request(reqwest_err),
                    Err(_) => DiscoveryError::Timeout(SITEMAP_FETCH_TIMEOUT_SECS),
                });
                continue;
            }
        };

        let urls = match SitemapFormat::detect(&text) {
            SitemapFormat::Xml => extract_from_xml(&text),
            SitemapFormat::PlainText => extract_from_plain_text(&text),
        };

        for u in urls {
            let same_domain = Url::parse(&u)
                .ok()
                .and_then(|parsed| parsed.host_str().map(|h| h.eq_ignore_ascii_case(domain)))
                .unwrap_or(false);
            if !same_domain {
                continue;
            }

            if looks_like_sitemap(&u) {
                if depth + 1 < MAX_RECURSION_DEPTH {
                    queue.push((u, depth + 1));
                } else {
                    last_error = Some(DiscoveryError::DepthExceeded);
                }
            } else {
                pages.push(u);
            }
        }
    }

    (pages, last_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_xml_format() {
        assert_eq!(SitemapFormat::detect("<loc>https://example.com</loc>"), SitemapFormat::Xml);
    }

    #[test]
    fn detects_plain_text_format() {
        assert_eq!(
            SitemapFormat::detect("https://example.com\nhttps://example.com/a"),
            SitemapFormat::PlainText
        );
    }

    #[test]
    fn extracts_urls_from_xml_index() {
        let xml = r#"<sitemapindex>
<sitemap><loc>https://example.com/sitemap-a.xml</loc></sitemap>
<sitemap><loc>https://example.com/sitemap-b.xml</loc></sitemap>
</sitemapindex>"#;
        let urls = extract_from_xml(xml);
        assert_eq!(urls, vec![
            "https://example.com/sitemap-a.xml",
            "https://example.com/sitemap-b.xml",
        ]);
    }

    #[test]
    fn extracts_urls_from_plain_text() {
        let text = "https://example.com/a\nhttps://example.com/b";
        assert_eq!(extract_from_plain_text(text).len(), 2);
    }

    #[tokio::test]
    async fn recurses_into_sitemap_index_then_collects_pages() {
        let mut server = mockito::Server::new_async().await;
        let host = server.host_with_port();
        let domain_only = host.split_once(':').map_or(host.as_str(), |(h, _)| h);

        let index_xml = format!(
            r#"<sitemapindex><sitemap><loc>http://{host}/sub-sitemap.xml</loc></sitemap></sitemapindex>"#
        );
        let sub_xml = format!(
            r#"<urlset><url><loc>http://{host}/a</loc></url><url><loc>http://{host}/b</loc></url></urlset>"#
        );

        let _m1 = server.mock("GET", "/sitemap.xml").with_status(200).with_body(index_xml).create_async().await;
        let _m2 = server.mock("GET", "/sub-sitemap.xml").with_status(200).with_body(sub_xml).create_async().await;

        let client = Client::new();
        let root = format!("http://{host}/sitemap.xml");
        let (pages, err) = discover_from(&client, domain_only, &root).await;
        assert!(err.is_none());
        assert_eq!(pages.len(), 2);
    }
}
