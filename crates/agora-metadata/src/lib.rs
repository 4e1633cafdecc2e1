//! Agora Metadata - Boundary to the asset metadata store
//!
//! The store keeps sealed asset documents keyed by DID. The orchestrator
//! only reads from it, to resolve a DID to its services and prices before an
//! order begins.

use std::sync::Arc;

use agora_types::{Ddo, Did};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Default page size of a search
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Errors that can occur in metadata store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Document not found: {did}")]
    NotFound { did: String },

    #[error("Document already exists: {did}")]
    AlreadyExists { did: String },

    #[error("Document has no DID; seal it before storing")]
    MissingId,

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("Metadata store unavailable: {message}")]
    Unavailable { message: String },
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// Full-text query over stored documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Case-insensitive text matched against the metadata service
    pub text: String,
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u32,
    /// Results per page
    #[serde(default = "default_page_size")]
    pub offset: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page: default_page(),
            offset: default_page_size(),
        }
    }

    pub fn page(mut self, page: u32, offset: u32) -> Self {
        self.page = page;
        self.offset = offset;
        self
    }
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<Ddo>,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
}

/// Metadata store operations
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store a sealed document
    async fn create_document(&self, ddo: Ddo) -> Result<Ddo>;

    /// Resolve a DID to its document
    async fn get_document(&self, did: &Did) -> Result<Ddo>;

    /// Search documents by text
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;
}

/// In-memory metadata store
#[derive(Clone, Default)]
pub struct InMemoryMetadataStore {
    /// Documents in insertion order
    documents: Arc<RwLock<Vec<Ddo>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn matches_text(ddo: &Ddo, needle: &str) -> bool {
    ddo.metadata_service()
        .map(|s| s.attributes.to_string().to_lowercase().contains(needle))
        .unwrap_or(false)
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create_document(&self, ddo: Ddo) -> Result<Ddo> {
        let did = ddo.id.clone().ok_or(MetadataError::MissingId)?;
        let mut documents = self.documents.write().await;
        if documents.iter().any(|d| d.id.as_ref() == Some(&did)) {
            return Err(MetadataError::AlreadyExists { did: did.to_string() });
        }
        documents.push(ddo.clone());
        debug!(did = %did, "Document stored");
        Ok(ddo)
    }

    async fn get_document(&self, did: &Did) -> Result<Ddo> {
        self.documents
            .read()
            .await
            .iter()
            .find(|d| d.id.as_ref() == Some(did))
            .cloned()
            .ok_or_else(|| MetadataError::NotFound { did: did.to_string() })
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        if query.page == 0 || query.offset == 0 {
            return Err(MetadataError::InvalidQuery {
                message: "page and offset start at 1".to_string(),
            });
        }
        let needle = query.text.to_lowercase();
        let documents = self.documents.read().await;
        let hits: Vec<&Ddo> = documents.iter().filter(|d| matches_text(d, &needle)).collect();

        let total_results = hits.len() as u32;
        let total_pages = total_results.div_ceil(query.offset);
        let start = ((query.page - 1) as usize).saturating_mul(query.offset as usize);
        let results = hits
            .into_iter()
            .skip(start)
            .take(query.offset as usize)
            .cloned()
            .collect();

        Ok(SearchPage {
            results,
            page: query.page,
            total_pages,
            total_results,
        })
    }
}
