use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::ingest::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::evaluation::DEFAULT_ANSWER_TIMEOUT_SECS;
use crate::pipeline::{DEFAULT_GENERATION_MODEL, DEFAULT_MAX_TOKENS};
use crate::retrieval::DEFAULT_TOP_K;
use crate::semantic::{DEFAULT_EMBEDDING_DIM, DEFAULT_MODEL_ID};

#[derive(Parser, Debug)]
#[command(
    name = "airman-rag",
    version,
    about = "Grounded question answering and evaluation over aviation PDF manuals"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Query(QueryArgs),
    Ask(AskArgs),
    Evaluate(EvaluateArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = ".cache/airman-rag")]
    pub cache_root: PathBuf,

    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub max_pages_per_doc: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIM)]
    pub embedding_dim: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long, default_value = ".cache/airman-rag")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub query: String,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub k: usize,

    #[arg(long)]
    pub model_id: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GenerationArgs {
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_GENERATION_MODEL)]
    pub generation_model: String,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub k: usize,
}

#[derive(Args, Debug, Clone)]
pub struct AskArgs {
    #[arg(long, default_value = ".cache/airman-rag")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub question: String,

    #[arg(long, default_value_t = false)]
    pub debug: bool,

    #[command(flatten)]
    pub generation: GenerationArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long, default_value = ".cache/airman-rag")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value = "questions.json")]
    pub questions_path: PathBuf,

    #[arg(long, default_value = "evaluation_results.json")]
    pub results_path: PathBuf,

    #[arg(long, default_value = "report.md")]
    pub report_path: PathBuf,

    /// Remote `ask` endpoint; the in-process pipeline is used when absent.
    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long, default_value_t = DEFAULT_ANSWER_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    #[command(flatten)]
    pub generation: GenerationArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/airman-rag")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

pub fn default_db_path(cache_root: &std::path::Path, db_path: Option<&PathBuf>) -> PathBuf {
    db_path
        .cloned()
        .unwrap_or_else(|| cache_root.join("corpus.sqlite"))
}
