mod hybrid;
mod lexical;
mod store;
mod vector;

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::semantic::{Embedder, LocalHashEmbedder};

pub use hybrid::{CandidateSource, HybridRetriever, RankedFragment};
pub use store::{
    DB_SCHEMA_VERSION, FragmentStore, active_model_id, ensure_schema, load_embeddings,
    open_read_only,
};
pub use vector::FlatL2Index;

pub const DEFAULT_TOP_K: usize = 3;

pub fn open_retriever(db_path: &Path, model_override: Option<&str>) -> Result<HybridRetriever> {
    if !db_path.exists() {
        bail!(
            "corpus database not found at {}; run `airman-rag ingest` first",
            db_path.display()
        );
    }

    let connection = open_read_only(db_path)?;
    let store = FragmentStore::load(&connection)?;

    let stored_model = active_model_id(&connection)?;
    let model_id = match (model_override, stored_model.as_deref()) {
        (Some(requested), Some(stored)) if requested != stored => bail!(
            "corpus was embedded with model '{stored}', not '{requested}'; re-run ingest with --model-id {requested}"
        ),
        (Some(requested), _) => requested.to_string(),
        (None, Some(stored)) => stored.to_string(),
        (None, None) if store.is_empty() => crate::semantic::DEFAULT_MODEL_ID.to_string(),
        (None, None) => bail!("corpus has fragments but no active embedding model"),
    };

    let dimensions: usize = connection
        .query_row(
            "SELECT dimensions FROM embedding_models WHERE model_id = ?1",
            [&model_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|value| value as usize)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows if store.is_empty() => {
                Ok(crate::semantic::DEFAULT_EMBEDDING_DIM)
            }
            other => Err(other),
        })
        .with_context(|| format!("embedding model '{model_id}' is not registered"))?;

    let embedder = LocalHashEmbedder::new(&model_id, dimensions);
    let vectors = load_embeddings(&connection, &model_id, embedder.dimensions())?;
    let index = FlatL2Index::new(embedder.dimensions(), vectors)?;
    if index.len() != store.len() {
        bail!(
            "vector index holds {} embeddings for {} fragments; re-run ingest",
            index.len(),
            store.len()
        );
    }

    info!(
        path = %db_path.display(),
        fragments = store.len(),
        model_id = %model_id,
        embedding_dim = embedder.dimensions(),
        "retriever initialised"
    );

    Ok(HybridRetriever::new(store, Box::new(embedder), Box::new(index)))
}
