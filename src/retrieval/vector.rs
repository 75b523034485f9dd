use anyhow::{Result, bail};

use crate::semantic::l2_distance;

pub trait VectorSearch {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;
}

#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatL2Index {
    pub fn new(dimensions: usize, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if let Some((index, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.len() != dimensions)
        {
            bail!(
                "vector {index} has {} dimensions, index expects {dimensions}",
                vector.len()
            );
        }

        Ok(Self {
            dimensions,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl VectorSearch for FlatL2Index {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimensions {
            bail!(
                "query vector has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            );
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self
            .vectors
            .iter()
            .enumerate()
            .map(|(index, vector)| Ok((index, l2_distance(query, vector)?)))
            .collect::<Result<Vec<(usize, f32)>>>()?;

        hits.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));
        hits.truncate(k);
        Ok(hits)
    }
}
