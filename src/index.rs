//! Per-user document index backed by Qdrant.
//!
//! Every chunk is stored with a `user_id` payload field, and every search
//! carries a mandatory equality filter on it, so one user's documents are never
//! visible to another's queries.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition, Filter, Match,
    PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::embeddings::EmbeddingClient;
use crate::Result;

const COLLECTION_NAME: &str = "user_documents";
const SCROLL_PAGE: u32 = 512;

/// One indexed slice of an uploaded document.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// Unique chunk id
    pub id: Uuid,
    /// Owning user
    pub user_id: i64,
    /// Source filename
    pub filename: String,
    /// Raw text of the chunk
    pub text: String,
}

impl DocumentChunk {
    pub fn new(user_id: i64, filename: impl Into<String>, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            filename: filename.into(),
            text,
        }
    }
}

/// Document index backed by Qdrant.
pub struct DocumentIndex {
    client: Qdrant,
    embedder: EmbeddingClient,
}

impl DocumentIndex {
    /// Connect to a Qdrant server.
    pub fn connect(url: &str, embedder: EmbeddingClient) -> Result<Self> {
        let client = Qdrant::from_url(url).build()?;
        Ok(Self { client, embedder })
    }

    /// Initialize the collection if it doesn't exist.
    pub async fn init_collection(&self) -> Result<()> {
        let collections = self.client.list_collections().await?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == COLLECTION_NAME);

        if !exists {
            info!("Creating collection '{}'", COLLECTION_NAME);

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(COLLECTION_NAME).vectors_config(
                        VectorParamsBuilder::new(
                            self.embedder.dimension() as u64,
                            Distance::Cosine,
                        ),
                    ),
                )
                .await?;

            info!("Collection created successfully");
        } else {
            debug!("Collection '{}' already exists", COLLECTION_NAME);
        }

        Ok(())
    }

    /// Embed and upsert chunks in one batch. Returns the number of points written.
    pub async fn upsert_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(embeddings)
            .filter_map(|(chunk, embedding)| {
                if embedding.is_empty() {
                    return None;
                }

                let mut payload: HashMap<String, QdrantValue> = HashMap::new();
                payload.insert("user_id".into(), chunk.user_id.into());
                payload.insert("filename".into(), chunk.filename.clone().into());
                payload.insert("text".into(), chunk.text.clone().into());

                Some(PointStruct::new(chunk.id.to_string(), embedding, payload))
            })
            .collect();

        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        debug!("Upserting {} points to Qdrant", count);

        self.client
            .upsert_points(UpsertPointsBuilder::new(COLLECTION_NAME, points))
            .await?;

        info!("Indexed {} document chunks", count);
        Ok(count)
    }

    /// Nearest-neighbour search scoped to one user. Returns non-empty chunk texts.
    pub async fn search(&self, user_id: i64, query: &str, limit: u64) -> Result<Vec<String>> {
        let query_embedding = self.embedder.embed(query).await?;

        let filter = Filter::must([FieldCondition {
            key: "user_id".to_string(),
            r#match: Some(Match {
                match_value: Some(qdrant_client::qdrant::r#match::MatchValue::Integer(user_id)),
            }),
            ..Default::default()
        }
        .into()]);

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(COLLECTION_NAME, query_embedding, limit)
                    .filter(filter)
                    .with_payload(true),
            )
            .await?;

        let texts: Vec<String> = results
            .result
            .into_iter()
            .filter_map(|point| point.payload.get("text")?.as_str().map(|s| s.to_string()))
            .filter(|t| !t.is_empty())
            .collect();

        debug!("Index search returned {} chunks for user {}", texts.len(), user_id);
        Ok(texts)
    }

    /// List every stored point id, paging through the collection.
    pub async fn all_point_ids(&self) -> Result<Vec<PointId>> {
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut scroll = ScrollPointsBuilder::new(COLLECTION_NAME)
                .limit(SCROLL_PAGE)
                .with_payload(false)
                .with_vectors(false);

            if let Some(next) = offset.take() {
                scroll = scroll.offset(next);
            }

            let page = self.client.scroll(scroll).await?;
            ids.extend(page.result.into_iter().filter_map(|p| p.id));

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }

    /// Bulk delete by point id list.
    pub async fn delete_by_ids(&self, ids: Vec<PointId>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.client
            .delete_points(DeletePointsBuilder::new(COLLECTION_NAME).points(ids))
            .await?;

        Ok(())
    }

    /// Delete everything currently stored in the index.
    ///
    /// Returns the number of chunks removed.
    pub async fn clear_all(&self) -> Result<usize> {
        let ids = self.all_point_ids().await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        self.delete_by_ids(ids).await?;

        info!("Index cleared: {} chunks deleted", count);
        Ok(count)
    }

    /// Point count for the collection.
    pub async fn stats(&self) -> Result<IndexStats> {
        let info = self.client.collection_info(COLLECTION_NAME).await?;

        Ok(IndexStats {
            points_count: info
                .result
                .map(|r| r.points_count.unwrap_or(0))
                .unwrap_or(0),
            dimension: self.embedder.dimension(),
        })
    }
}

/// Collection statistics
#[derive(Debug)]
pub struct IndexStats {
    pub points_count: u64,
    pub dimension: usize,
}

/// The slice of the index the retrieval engine consumes.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Nearest chunk texts for one user's query.
    async fn search_chunks(&self, user_id: i64, query: &str, limit: u64) -> Result<Vec<String>>;

    /// Remove every stored chunk. Returns the number removed.
    async fn clear_chunks(&self) -> Result<usize>;
}

#[async_trait]
impl DocumentSearch for DocumentIndex {
    async fn search_chunks(&self, user_id: i64, query: &str, limit: u64) -> Result<Vec<String>> {
        self.search(user_id, query, limit).await
    }

    async fn clear_chunks(&self) -> Result<usize> {
        self.clear_all().await
    }
}
