use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::model::{DocumentEntry, Fragment};
use crate::retrieval::ensure_schema;
use crate::semantic::{Embedder, encode_embedding_blob};

pub struct CorpusSnapshot<'a> {
    pub documents: &'a [DocumentEntry],
    pub fragments: &'a [Fragment],
    pub embeddings: &'a [Vec<f32>],
    pub model_id: &'a str,
    pub embedding_dim: usize,
    pub ingested_at: &'a str,
}

pub fn embed_fragments(
    embedder: &dyn Embedder,
    fragments: &[Fragment],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::<Vec<f32>>::with_capacity(fragments.len());

    for (batch_index, batch) in fragments.chunks(batch_size.max(1)).enumerate() {
        let texts = batch
            .iter()
            .map(|fragment| fragment.text.clone())
            .collect::<Vec<String>>();
        let vectors = embedder
            .embed(&texts)
            .with_context(|| format!("failed to embed batch {batch_index}"))?;
        if vectors.len() != texts.len() {
            bail!(
                "embedder returned {} vectors for {} fragments in batch {batch_index}",
                vectors.len(),
                texts.len()
            );
        }
        if let Some(bad) = vectors
            .iter()
            .find(|vector| vector.len() != embedder.dimensions())
        {
            bail!(
                "embedder returned a {}-dim vector, expected {}",
                bad.len(),
                embedder.dimensions()
            );
        }

        debug!(batch = batch_index, size = vectors.len(), "embedded batch");
        out.extend(vectors);
    }

    Ok(out)
}

pub fn replace_corpus(connection: &mut Connection, snapshot: &CorpusSnapshot<'_>) -> Result<()> {
    if snapshot.embeddings.len() != snapshot.fragments.len() {
        bail!(
            "{} embeddings for {} fragments",
            snapshot.embeddings.len(),
            snapshot.fragments.len()
        );
    }

    ensure_schema(connection)?;
    let tx = connection
        .transaction()
        .context("failed to start corpus transaction")?;

    tx.execute_batch(
        "
        DELETE FROM fragment_embeddings;
        DELETE FROM fragments;
        DELETE FROM documents;
        DELETE FROM embedding_models;
        ",
    )
    .context("failed to clear previous corpus")?;

    {
        let mut insert_document = tx.prepare(
            "INSERT INTO documents(filename, sha256, page_count, fragment_count) VALUES(?1, ?2, ?3, ?4)",
        )?;
        for document in snapshot.documents {
            insert_document
                .execute(params![
                    document.filename,
                    document.sha256,
                    document.page_count as i64,
                    document.fragment_count as i64
                ])
                .with_context(|| format!("failed to insert document {}", document.filename))?;
        }

        tx.execute(
            "INSERT INTO embedding_models(model_id, dimensions, created_at) VALUES(?1, ?2, ?3)",
            params![
                snapshot.model_id,
                snapshot.embedding_dim as i64,
                snapshot.ingested_at
            ],
        )
        .context("failed to register embedding model")?;

        let mut insert_fragment = tx.prepare(
            "INSERT INTO fragments(fragment_idx, source_document, page_index, text) VALUES(?1, ?2, ?3, ?4)",
        )?;
        let mut insert_embedding = tx.prepare(
            "INSERT INTO fragment_embeddings(fragment_idx, model_id, embedding, embedding_dim) VALUES(?1, ?2, ?3, ?4)",
        )?;
        for (index, (fragment, vector)) in snapshot
            .fragments
            .iter()
            .zip(snapshot.embeddings)
            .enumerate()
        {
            insert_fragment
                .execute(params![
                    index as i64,
                    fragment.source_document,
                    fragment.page_index,
                    fragment.text
                ])
                .with_context(|| format!("failed to insert fragment {index}"))?;
            insert_embedding
                .execute(params![
                    index as i64,
                    snapshot.model_id,
                    encode_embedding_blob(vector),
                    vector.len() as i64
                ])
                .with_context(|| format!("failed to insert embedding {index}"))?;
        }
    }

    for (key, value) in [
        ("active_model_id", snapshot.model_id),
        ("ingested_at", snapshot.ingested_at),
    ] {
        tx.execute(
            "
            INSERT INTO metadata(key, value) VALUES(?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            ",
            params![key, value],
        )?;
    }

    tx.commit().context("failed to commit corpus")?;
    Ok(())
}
