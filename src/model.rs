use serde::{Deserialize, Serialize};

pub const DEDUP_PREFIX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(alias = "doc")]
    pub source_document: String,
    #[serde(alias = "page")]
    pub page_index: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub source_document: String,
    pub page_index: u32,
    pub text_prefix: String,
}

impl Fragment {
    pub fn new(
        source_document: impl Into<String>,
        page_index: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_document: source_document.into(),
            page_index,
            text: text.into(),
        }
    }

    pub fn dedup_key(&self) -> FragmentKey {
        FragmentKey {
            source_document: self.source_document.clone(),
            page_index: self.page_index,
            text_prefix: self.text.chars().take(DEDUP_PREFIX_CHARS).collect(),
        }
    }

    pub fn citation(&self) -> String {
        format!(
            "{} page {}",
            self.source_document,
            u64::from(self.page_index) + 1
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default, alias = "chunks", skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntry {
    pub question: String,
    #[serde(rename = "type", default = "default_question_type")]
    pub question_type: String,
}

fn default_question_type() -> String {
    "factual".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub answer: String,
    pub citations: Vec<String>,
    pub fragments: Vec<Fragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retrieval_hit: bool,
    pub faithfulness: f64,
    pub hallucination: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub filename: String,
    pub sha256: String,
    pub page_count: usize,
    pub fragment_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestCounts {
    pub pdf_count: usize,
    pub page_count: usize,
    pub empty_page_count: usize,
    pub fragment_count: usize,
    pub embedded_fragment_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub data_dir: String,
    pub db_path: String,
    pub model_id: String,
    pub embedding_dim: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub counts: IngestCounts,
    pub documents: Vec<DocumentEntry>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRunSnapshot {
    pub run_id: Option<String>,
    pub status: Option<String>,
    pub updated_at: Option<String>,
    pub model_id: Option<String>,
    pub warnings: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_uses_fifty_character_prefix() {
        let shared = "x".repeat(DEDUP_PREFIX_CHARS);
        let left = Fragment::new("a.pdf", 2, format!("{shared} tail one"));
        let right = Fragment::new("a.pdf", 2, format!("{shared} tail two"));
        assert_eq!(left.dedup_key(), right.dedup_key());

        let other_page = Fragment::new("a.pdf", 3, format!("{shared} tail one"));
        assert_ne!(left.dedup_key(), other_page.dedup_key());
    }

    #[test]
    fn dedup_key_counts_characters_not_bytes() {
        let fragment = Fragment::new("b.pdf", 0, "é".repeat(60));
        assert_eq!(fragment.dedup_key().text_prefix.chars().count(), 50);
    }

    #[test]
    fn citation_is_one_based() {
        let fragment = Fragment::new("a.pdf", 0, "engines");
        assert_eq!(fragment.citation(), "a.pdf page 1");
    }

    #[test]
    fn ask_response_accepts_legacy_chunk_keys() {
        let raw = r#"
        {
          "answer": "Every 50 hours.",
          "citations": ["a.pdf page 1"],
          "chunks": [{"doc": "a.pdf", "page": 0, "text": "inspection every 50 hours"}]
        }
        "#;

        let response: AskResponse =
            serde_json::from_str(raw).expect("legacy response should deserialize");
        assert_eq!(response.fragments.len(), 1);
        assert_eq!(response.fragments[0].source_document, "a.pdf");
        assert_eq!(response.fragments[0].page_index, 0);
    }

    #[test]
    fn question_type_defaults_to_factual() {
        let entry: QuestionEntry =
            serde_json::from_str(r#"{"question": "What is VFR?"}"#).expect("question parses");
        assert_eq!(entry.question_type, "factual");
    }
}
