use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::error::RetrievalError;
use crate::model::Fragment;
use crate::semantic::Embedder;

use super::lexical::Bm25Index;
use super::store::FragmentStore;
use super::vector::VectorSearch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Vector,
    Lexical,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedFragment {
    pub fragment_index: usize,
    pub source: CandidateSource,
    pub vector_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
    pub vector_distance: Option<f32>,
    pub lexical_score: Option<f64>,
    pub fragment: Fragment,
}

pub struct HybridRetriever {
    store: FragmentStore,
    lexical: Bm25Index,
    embedder: Box<dyn Embedder>,
    vectors: Box<dyn VectorSearch>,
}

impl HybridRetriever {
    pub fn new(
        store: FragmentStore,
        embedder: Box<dyn Embedder>,
        vectors: Box<dyn VectorSearch>,
    ) -> Self {
        let lexical = Bm25Index::build(
            store
                .fragments()
                .iter()
                .map(|fragment| fragment.text.as_str()),
        );

        Self {
            store,
            lexical,
            embedder,
            vectors,
        }
    }

    pub fn store(&self) -> &FragmentStore {
        &self.store
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Fragment>, RetrievalError> {
        Ok(self
            .retrieve_ranked(query, k)?
            .into_iter()
            .map(|ranked| ranked.fragment)
            .collect())
    }

    pub fn retrieve_ranked(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedFragment>, RetrievalError> {
        if k == 0 || self.store.is_empty() {
            debug!(k, corpus_size = self.store.len(), "retrieval skipped");
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .map_err(|err| RetrievalError::unavailable("embedding", &err))?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Unavailable {
                stage: "embedding",
                reason: "embedding service returned no vector".to_string(),
            })?;

        let vector_hits = self
            .vectors
            .search(&query_vector, k)
            .map_err(|err| RetrievalError::unavailable("vector search", &err))?;

        let mut candidates = Vec::<(usize, CandidateSource)>::with_capacity(k * 2);
        for (fragment_index, _) in &vector_hits {
            if *fragment_index >= self.store.len() {
                return Err(RetrievalError::Unavailable {
                    stage: "vector search",
                    reason: format!(
                        "hit {fragment_index} is outside the corpus of {} fragments",
                        self.store.len()
                    ),
                });
            }
            candidates.push((*fragment_index, CandidateSource::Vector));
        }

        let lexical_hits = self.lexical.top_k(query, k);
        for (fragment_index, _) in &lexical_hits {
            candidates.push((*fragment_index, CandidateSource::Lexical));
        }

        let mut seen = HashSet::new();
        let mut out = Vec::<RankedFragment>::with_capacity(k);
        for (fragment_index, source) in &candidates {
            let Some(fragment) = self.store.get(*fragment_index) else {
                continue;
            };
            if !seen.insert(fragment.dedup_key()) {
                continue;
            }

            let vector_position = vector_hits
                .iter()
                .position(|(index, _)| index == fragment_index);
            let lexical_position = lexical_hits
                .iter()
                .position(|(index, _)| index == fragment_index);
            out.push(RankedFragment {
                fragment_index: *fragment_index,
                source: *source,
                vector_rank: vector_position.map(|position| position + 1),
                lexical_rank: lexical_position.map(|position| position + 1),
                vector_distance: vector_position.map(|position| vector_hits[position].1),
                lexical_score: lexical_position.map(|position| lexical_hits[position].1),
                fragment: fragment.clone(),
            });
            if out.len() >= k {
                break;
            }
        }

        debug!(
            vector_candidates = vector_hits.len(),
            lexical_candidates = lexical_hits.len(),
            returned = out.len(),
            "hybrid retrieval fused"
        );

        Ok(out)
    }
}
