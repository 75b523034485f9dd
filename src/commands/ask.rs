use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{AskArgs, GenerationArgs, default_db_path};
use crate::pipeline::{AnswerKind, AnswerPipeline, AnthropicConfig, AnthropicGenerator};
use crate::retrieval::open_retriever;

pub fn run(args: AskArgs) -> Result<()> {
    let db_path = default_db_path(&args.cache_root, args.db_path.as_ref());
    let pipeline = open_pipeline(&db_path, &args.generation)?;

    let response = pipeline.ask_question(&args.question, args.debug)?;
    info!(
        kind = ?AnswerKind::classify(&response.answer),
        citations = response.citations.len(),
        "answer ready"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize answer json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

pub fn open_pipeline(db_path: &Path, generation: &GenerationArgs) -> Result<AnswerPipeline> {
    let retriever = open_retriever(db_path, None)?;

    let mut config = AnthropicConfig::new(generation.api_key.clone().unwrap_or_default());
    config.model = generation.generation_model.clone();
    config.max_tokens = generation.max_tokens;
    let generator = AnthropicGenerator::new(config)?;

    Ok(AnswerPipeline::new(retriever, Box::new(generator), generation.k))
}
