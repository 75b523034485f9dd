use std::collections::HashMap;

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    term_frequencies: Vec<HashMap<String, u32>>,
    doc_lengths: Vec<usize>,
    avg_doc_length: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Index {
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut term_frequencies = Vec::<HashMap<String, u32>>::new();
        let mut doc_lengths = Vec::<usize>::new();
        let mut document_frequencies = HashMap::<String, usize>::new();

        for text in texts {
            let mut frequencies = HashMap::<String, u32>::new();
            let mut length = 0usize;
            for term in tokenize_terms(text) {
                *frequencies.entry(term.to_string()).or_insert(0) += 1;
                length += 1;
            }
            for term in frequencies.keys() {
                *document_frequencies.entry(term.clone()).or_insert(0) += 1;
            }
            term_frequencies.push(frequencies);
            doc_lengths.push(length);
        }

        let corpus_size = doc_lengths.len() as f64;
        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f64 / corpus_size
        };

        // Lucene-style idf stays positive even for terms present in every fragment.
        let idf = document_frequencies
            .into_iter()
            .map(|(term, frequency)| {
                let frequency = frequency as f64;
                let value = (1.0 + (corpus_size - frequency + 0.5) / (frequency + 0.5)).ln();
                (term, value)
            })
            .collect();

        Self {
            term_frequencies,
            doc_lengths,
            avg_doc_length,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    pub fn scores(&self, query: &str) -> Vec<f64> {
        let mut scores = vec![0.0_f64; self.len()];

        for term in tokenize_terms(query) {
            let Some(idf) = self.idf.get(term) else {
                continue;
            };

            for (index, frequencies) in self.term_frequencies.iter().enumerate() {
                let Some(frequency) = frequencies.get(term) else {
                    continue;
                };
                let frequency = f64::from(*frequency);
                let length_ratio = if self.avg_doc_length > 0.0 {
                    self.doc_lengths[index] as f64 / self.avg_doc_length
                } else {
                    1.0
                };
                let denominator = frequency + BM25_K1 * (1.0 - BM25_B + BM25_B * length_ratio);
                scores[index] += idf * frequency * (BM25_K1 + 1.0) / denominator;
            }
        }

        scores
    }

    pub fn top_k(&self, query: &str, k: usize) -> Vec<(usize, f64)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut ranked = self
            .scores(query)
            .into_iter()
            .enumerate()
            .collect::<Vec<(usize, f64)>>();
        ranked.sort_by(|left, right| right.1.total_cmp(&left.1));
        ranked.truncate(k);
        ranked
    }
}

fn tokenize_terms(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}
