//! In-memory document store and knowledge base compiler
//!
//! Documents live only for the lifetime of the process. Any change to the
//! document list invalidates the compiled knowledge base until the next
//! `ingest`.

use serde::Serialize;

use crate::extraction::{extension_of, DocumentFormat, Extractor};
use crate::utils::{size_label, truncate_chars};

const PREVIEW_CHARS: usize = 120;
const RULE_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
    #[error("Already uploaded: {0}")]
    Duplicate(String),
    #[error("File too large: {0}")]
    TooLarge(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No documents to ingest")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub format: DocumentFormat,
    /// Original upload size in bytes
    pub size: usize,
    /// Extracted (or fallback) text
    pub content: String,
    pub ingested: bool,
}

/// JSON view of a document for the UI
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub name: String,
    pub ext: &'static str,
    pub size: usize,
    pub size_label: String,
    pub ingested: bool,
    pub preview: String,
}

impl Document {
    pub fn new(name: impl Into<String>, format: DocumentFormat, size: usize, content: String) -> Self {
        Self {
            name: name.into(),
            format,
            size,
            content,
            ingested: false,
        }
    }

    pub fn size_label(&self) -> String {
        size_label(self.size)
    }

    pub fn preview(&self) -> String {
        let head = truncate_chars(&self.content, PREVIEW_CHARS);
        if head.len() < self.content.len() {
            format!("{}…", head)
        } else {
            head.to_string()
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            name: self.name.clone(),
            ext: self.format.extension(),
            size: self.size,
            size_label: self.size_label(),
            ingested: self.ingested,
            preview: self.preview(),
        }
    }

    /// Banner + content block used in the compiled knowledge base
    fn knowledge_block(&self) -> String {
        let rule = "━".repeat(RULE_WIDTH);
        format!(
            "{rule}\nDOCUMENT : {name}\nFORMAT   : {ext}   SIZE: {size}\n{rule}\n\n{content}\n",
            rule = rule,
            name = self.name,
            ext = self.format.extension().to_uppercase(),
            size = self.size_label(),
            content = self.content,
        )
    }
}

#[derive(Debug)]
pub struct DocumentStore {
    documents: Vec<Document>,
    knowledge_base: String,
    is_ingested: bool,
    max_upload_bytes: usize,
}

impl DocumentStore {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self {
            documents: Vec::new(),
            knowledge_base: String::new(),
            is_ingested: false,
            max_upload_bytes,
        }
    }

    /// Decide whether an upload may be added, before spending time on extraction
    pub fn check_new(&self, name: &str, size: usize) -> Result<DocumentFormat, StoreError> {
        let ext = extension_of(name);
        let format = DocumentFormat::from_extension(&ext).ok_or(StoreError::Unsupported(ext))?;

        if self.contains(name) {
            return Err(StoreError::Duplicate(name.to_string()));
        }
        if size > self.max_upload_bytes {
            return Err(StoreError::TooLarge(name.to_string()));
        }
        Ok(format)
    }

    /// Store an already-extracted document
    pub fn insert(&mut self, doc: Document) -> Result<String, StoreError> {
        // Another upload with the same name may have landed while we were extracting
        if self.contains(&doc.name) {
            return Err(StoreError::Duplicate(doc.name));
        }
        let message = format!("Added: {}", doc.name);
        self.documents.push(doc);
        self.is_ingested = false;
        Ok(message)
    }

    /// Validate, extract, and store in one step
    pub fn add(&mut self, name: &str, data: &[u8], extractor: &Extractor) -> Result<String, StoreError> {
        let format = self.check_new(name, data.len())?;
        let content = extractor.extract(data, name, format);
        self.insert(Document::new(name, format, data.len(), content))
    }

    pub fn remove(&mut self, name: &str) -> Result<String, StoreError> {
        let before = self.documents.len();
        self.documents.retain(|d| d.name != name);
        if self.documents.len() == before {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.is_ingested = false;
        self.knowledge_base.clear();
        Ok(format!("Removed: {}", name))
    }

    /// Compile all documents into the knowledge base string
    pub fn ingest(&mut self) -> Result<String, StoreError> {
        if self.documents.is_empty() {
            return Err(StoreError::Empty);
        }

        self.knowledge_base = self
            .documents
            .iter()
            .map(Document::knowledge_block)
            .collect::<Vec<_>>()
            .join("\n");
        self.is_ingested = true;
        for doc in &mut self.documents {
            doc.ingested = true;
        }

        let count = self.documents.len();
        Ok(format!("{} document{} ingested", count, if count == 1 { "" } else { "s" }))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.documents.iter().any(|d| d.name == name)
    }

    pub fn knowledge_base(&self) -> &str {
        &self.knowledge_base
    }

    pub fn is_ingested(&self) -> bool {
        self.is_ingested
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn summaries(&self) -> Vec<DocumentSummary> {
        self.documents.iter().map(Document::summary).collect()
    }
}
