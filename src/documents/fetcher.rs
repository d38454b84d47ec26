//! HTTP retrieval of remote documents.
//!
//! Wraps a pooled reqwest client. Enforces the http/https scheme, a body
//! size cap (checked against `Content-Length` and again while streaming),
//! and detects the document format from the content type, the URL
//! extension, or the leading bytes, in that order.

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::time::Duration;
use url::Url;

use super::config::FetchConfig;
use super::types::{DocumentFormat, FetchedDocument};
use crate::error::FetchError;

/// Source of raw document bytes.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError>;
}

/// Fetches documents over HTTP(S).
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Fails when the client cannot be built from `config`, e.g. a user
    /// agent that is not a valid header value.
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { client, config })
    }

    fn is_accepted(&self, content_type: &str) -> bool {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        self.config
            .accepted_content_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(mime))
    }
}

/// Validate a document URL, allowing only http and https.
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}' (only http/https allowed)"),
        }),
    }
}

/// Infer the format from the last path segment's extension.
pub fn format_from_url(url: &Url) -> Option<DocumentFormat> {
    let segment = url.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    DocumentFormat::from_extension(ext)
}

/// Pick the document format: accepted content type, then URL extension, then magic bytes.
pub fn detect_format(
    content_type: Option<&str>,
    url: &Url,
    bytes: &[u8],
) -> Result<DocumentFormat, FetchError> {
    if let Some(format) = content_type.and_then(DocumentFormat::from_content_type) {
        return Ok(format);
    }
    if let Some(format) = format_from_url(url) {
        return Ok(format);
    }
    if let Some(format) = DocumentFormat::sniff(bytes) {
        return Ok(format);
    }

    Err(FetchError::UnsupportedFormat {
        detail: format!(
            "content type '{}' at {}",
            content_type.unwrap_or("unknown"),
            url
        ),
    })
}

fn classify_request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl DocumentSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let parsed = validate_url(url)?;
        let limit = self.config.max_bytes;

        tracing::debug!(target: "fetch", "downloading {url}");

        let mut response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Unreachable {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared_len.is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::with_capacity(declared_len.unwrap_or(0) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify_request_error(url, e))?
        {
            if (bytes.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        // Unaccepted content types (e.g. application/octet-stream) fall through
        // to extension and magic-byte detection.
        let accepted_type = content_type.as_deref().filter(|ct| self.is_accepted(ct));
        let format = detect_format(accepted_type, &parsed, &bytes)?;

        tracing::info!(
            target: "fetch",
            "downloaded {url}: {} bytes, format {format}",
            bytes.len()
        );

        Ok(FetchedDocument {
            url: url.to_string(),
            bytes,
            content_type,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            validate_url("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_invalid_scheme() {
        assert!(matches!(
            validate_url("ftp://example.com/policy.pdf"),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(validate_url("https://example.com/policy.pdf").is_ok());
    }

    #[test]
    fn test_format_from_url_ignores_query() {
        let url = Url::parse("https://cdn.example.com/docs/Policy.PDF?sv=2023&sig=abc").unwrap();
        assert_eq!(format_from_url(&url), Some(DocumentFormat::Pdf));

        let url = Url::parse("https://example.com/handbook.docx").unwrap();
        assert_eq!(format_from_url(&url), Some(DocumentFormat::Docx));

        let url = Url::parse("https://example.com/download").unwrap();
        assert_eq!(format_from_url(&url), None);
    }

    #[test]
    fn test_detect_format_precedence() {
        let url = Url::parse("https://example.com/file.docx").unwrap();

        // Content type wins over extension
        let format = detect_format(Some("application/pdf"), &url, b"").unwrap();
        assert_eq!(format, DocumentFormat::Pdf);

        // Extension wins over magic bytes
        let format = detect_format(None, &url, b"%PDF-1.4").unwrap();
        assert_eq!(format, DocumentFormat::Docx);

        // Magic bytes as last resort
        let url = Url::parse("https://example.com/blob").unwrap();
        let format = detect_format(None, &url, b"%PDF-1.4").unwrap();
        assert_eq!(format, DocumentFormat::Pdf);

        assert!(matches!(
            detect_format(Some("text/html"), &url, b"<html>"),
            Err(FetchError::UnsupportedFormat { .. })
        ));
    }
}
