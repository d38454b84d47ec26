//! Shared fixtures for integration tests: generated documents, an in-process
//! HTTP server, and deterministic mock capabilities.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use docquery::answer::{LanguageModel, Prompt};
use docquery::documents::{ChunkingConfig, DocumentFormat, DocumentSource, FetchedDocument};
use docquery::error::{EmbeddingError, FetchError, ModelError};
use docquery::semantic::EmbeddingGenerator;
use docquery::Settings;

/// Four 20-word sections of a small insurance policy.
pub const POLICY_SECTIONS: [&str; 4] = [
    "Section one Definitions. The insured person means the policyholder named in the schedule and every single dependant who is listed.",
    "Section two Grace period. A grace period of thirty days is allowed for payment of the renewal premium each year.",
    "Section three Waiting period. Pre-existing diseases are covered only after thirty six months of continuous cover since the inception date.",
    "Section four Claims. Claims must be notified within seven days of admission and documents submitted within fifteen days after discharge.",
];

pub const POLICY_URL: &str = "https://docs.example.com/policy.docx";

/// Settings sized for the fixtures: one chunk per policy section.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.chunking = ChunkingConfig {
        chunk_words: 20,
        overlap_words: 0,
        min_chunk_words: 5,
    };
    settings.retrieval.top_k = 3;
    settings.retrieval.threshold = 0.25;
    settings.query.request_timeout_secs = 10;
    settings.query.max_parallel_questions = 3;
    settings
}

// ---------------------------------------------------------------------------
// Document fixtures
// ---------------------------------------------------------------------------

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Minimal DOCX archive with one `w:p` per paragraph.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", escape_xml(p)))
        .collect();
    let document_xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );
    let content_types = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
        <Override PartName=\"/word/document.xml\" \
        ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
        </Types>";

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(content_types.as_bytes()).unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(document_xml.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

/// Single-page PDF with one text line per entry, in a standard font.
pub fn pdf_bytes(lines: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("TL", vec![14.into()]),
        Operation::new("Td", vec![50.into(), 780.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

// ---------------------------------------------------------------------------
// HTTP fixture server
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral local port.
pub async fn spawn_server(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

// ---------------------------------------------------------------------------
// Mock capabilities
// ---------------------------------------------------------------------------

/// In-memory document source serving DOCX fixtures by URL.
pub struct MockSource {
    documents: HashMap<String, Vec<u8>>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_docx(mut self, url: &str, paragraphs: &[&str]) -> Self {
        self.documents.insert(url.to_string(), docx_bytes(paragraphs));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn policy() -> Self {
        Self::new().with_docx(POLICY_URL, &POLICY_SECTIONS)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MockSource {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let bytes = self
            .documents
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Unreachable {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })?;
        Ok(FetchedDocument {
            url: url.to_string(),
            bytes,
            content_type: None,
            format: DocumentFormat::Docx,
        })
    }
}

/// Deterministic bag-of-words embedder using hashed word buckets.
pub struct MockEmbeddingGenerator {
    model_id: String,
    dimension: usize,
    calls: AtomicUsize,
}

impl MockEmbeddingGenerator {
    pub fn new() -> Self {
        Self::with_model("mock-bow-v1")
    }

    pub fn with_model(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            dimension: 256,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Language model that answers with the first context passage.
///
/// Prompts mentioning `SLOW` wait `slow_delay`; prompts mentioning `FAIL`
/// are rate limited.
pub struct ExtractiveModel {
    slow_delay: Duration,
    prompts: Mutex<Vec<Prompt>>,
}

impl ExtractiveModel {
    pub fn new() -> Self {
        Self::with_slow_delay(Duration::from_secs(5))
    }

    pub fn with_slow_delay(slow_delay: Duration) -> Self {
        Self {
            slow_delay,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ExtractiveModel {
    async fn generate(
        &self,
        prompt: &Prompt,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, ModelError> {
        self.prompts.lock().push(prompt.clone());

        if prompt.user.contains("SLOW") {
            tokio::time::sleep(self.slow_delay).await;
        }
        if prompt.user.contains("FAIL") {
            return Err(ModelError::RateLimited);
        }

        // Passage text follows the "[1] (...)" header line
        let passage = prompt
            .user
            .lines()
            .skip_while(|line| !line.starts_with("[1]"))
            .nth(1)
            .unwrap_or("");
        Ok(passage.to_string())
    }

    fn model_id(&self) -> &str {
        "extractive-mock"
    }
}
