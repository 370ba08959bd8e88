use super::{normalize_whitespace, DocumentSource, SourceDocument};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Page separator emitted by the text extractor
const PAGE_BREAK: char = '\u{c}';

/// Downloads PDFs over HTTP and extracts their text page by page
pub struct PdfUrlSource {
    client: Client,
    urls: Vec<String>,
}

impl PdfUrlSource {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("pdf-assistant/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, urls })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url = %url, "Downloading PDF");
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn read_one(&self, url: &str) -> Result<Vec<SourceDocument>> {
        let bytes = self.download(url).await?;
        if !bytes.starts_with(b"%PDF") {
            return Err(Error::Pdf(format!("{} is not a PDF document", url)));
        }

        // pdf-extract is CPU bound and may panic on malformed input
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| Error::Pdf(format!("PDF extraction aborted for {}: {}", url, e)))?
            .map_err(|e| Error::Pdf(format!("Failed to extract text from {}: {}", url, e)))?;

        let documents = split_pages(url, &text);
        if documents.is_empty() {
            warn!(url = %url, "PDF contained no extractable text");
        }
        Ok(documents)
    }
}

#[async_trait]
impl DocumentSource for PdfUrlSource {
    fn locators(&self) -> &[String] {
        &self.urls
    }

    async fn read(&self) -> Result<Vec<SourceDocument>> {
        let mut documents = Vec::new();
        for url in &self.urls {
            let pages = self.read_one(url).await?;
            info!(url = %url, pages = pages.len(), "Read PDF");
            documents.extend(pages);
        }
        Ok(documents)
    }
}

/// Base name for documents read from a locator (file stem of the URL path)
pub fn document_stem(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => segment,
        })
        .unwrap_or_else(|| "document".to_string())
}

/// Split extracted text into one document per non-empty page
pub fn split_pages(url: &str, text: &str) -> Vec<SourceDocument> {
    let stem = document_stem(url);

    text.split(PAGE_BREAK)
        .enumerate()
        .filter_map(|(i, page)| {
            let cleaned = normalize_whitespace(page);
            if cleaned.is_empty() {
                return None;
            }
            let page_number = i + 1;
            Some(SourceDocument {
                name: format!("{}_{}", stem, page_number),
                uri: url.to_string(),
                page: page_number,
                text: cleaned,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_document_stem() {
        assert_eq!(
            document_stem("https://phi-public.s3.amazonaws.com/recipes/ThaiRecipes.pdf"),
            "ThaiRecipes"
        );
        assert_eq!(document_stem("https://example.com/"), "document");
        assert_eq!(document_stem("not a url"), "document");
    }

    #[test]
    fn test_split_pages_skips_blank_pages() {
        let text = "Pad Thai\n\nNoodles\u{c}  \n \u{c}Green Curry";
        let docs = split_pages("https://example.com/ThaiRecipes.pdf", text);

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "ThaiRecipes_1");
        assert_eq!(docs[0].text, "Pad Thai\n\nNoodles");
        assert_eq!(docs[1].page, 3);
        assert_eq!(docs[1].name, "ThaiRecipes_3");
    }

    #[tokio::test]
    async fn test_non_pdf_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recipes.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"<html></html>".to_vec(), "text/html"),
            )
            .mount(&server)
            .await;

        let source = PdfUrlSource::new(vec![format!("{}/recipes.pdf", server.uri())]).unwrap();
        match source.read().await {
            Err(Error::Pdf(message)) => assert!(message.contains("not a PDF")),
            other => panic!("expected PDF error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = PdfUrlSource::new(vec![format!("{}/missing.pdf", server.uri())]).unwrap();
        assert!(matches!(source.read().await, Err(Error::Http(_))));
    }
}
