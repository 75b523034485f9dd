use std::io::{self, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::{QueryArgs, default_db_path};
use crate::retrieval::{CandidateSource, RankedFragment, open_retriever};

const SNIPPET_CHARS: usize = 160;

#[derive(Debug, Serialize)]
struct QueryResponse {
    query: String,
    k: usize,
    returned: usize,
    model_id: String,
    corpus_size: usize,
    query_duration_ms: f64,
    results: Vec<QueryResult>,
}

#[derive(Debug, Serialize)]
struct QueryResult {
    rank: usize,
    #[serde(flatten)]
    ranked: RankedFragment,
    citation: String,
}

pub fn run(args: QueryArgs) -> Result<()> {
    let db_path = default_db_path(&args.cache_root, args.db_path.as_ref());
    let retriever = open_retriever(&db_path, args.model_id.as_deref())?;

    let started = Instant::now();
    let ranked = retriever.retrieve_ranked(&args.query, args.k)?;
    let query_duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    info!(
        query = %args.query,
        k = args.k,
        returned = ranked.len(),
        duration_ms = query_duration_ms,
        "query completed"
    );

    let response = QueryResponse {
        query: args.query.clone(),
        k: args.k,
        returned: ranked.len(),
        model_id: retriever.model_id().to_string(),
        corpus_size: retriever.store().len(),
        query_duration_ms,
        results: ranked
            .into_iter()
            .enumerate()
            .map(|(index, ranked)| QueryResult {
                rank: index + 1,
                citation: ranked.fragment.citation(),
                ranked,
            })
            .collect(),
    };

    if args.json {
        write_json_response(&response)
    } else {
        write_text_response(&response)
    }
}

fn write_json_response(response: &QueryResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, response)
        .context("failed to serialize query json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(response: &QueryResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Query: {}", response.query)?;
    writeln!(
        output,
        "Retrieval: model={} corpus={} k={} duration_ms={:.3}",
        response.model_id, response.corpus_size, response.k, response.query_duration_ms
    )?;
    writeln!(output, "Results: {}", response.returned)?;

    for result in &response.results {
        let ranked = &result.ranked;
        writeln!(
            output,
            "{}.\t{}\tfragment={}\tsource={}",
            result.rank,
            result.citation,
            ranked.fragment_index,
            source_label(ranked)
        )?;
        if let Some(vector_rank) = ranked.vector_rank {
            writeln!(
                output,
                "\tvector_rank: {vector_rank} distance={:.6}",
                ranked.vector_distance.unwrap_or_default()
            )?;
        }
        if let Some(lexical_rank) = ranked.lexical_rank {
            writeln!(
                output,
                "\tlexical_rank: {lexical_rank} bm25={:.6}",
                ranked.lexical_score.unwrap_or_default()
            )?;
        }
        writeln!(output, "\tsnippet: {}", snippet(&ranked.fragment.text))?;
    }

    output.flush()?;
    Ok(())
}

fn source_label(ranked: &RankedFragment) -> &'static str {
    match ranked.source {
        CandidateSource::Vector => "vector",
        CandidateSource::Lexical => "lexical",
    }
}

fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<&str>>().join(" ");
    if collapsed.chars().count() <= SNIPPET_CHARS {
        return collapsed;
    }
    let mut out = collapsed.chars().take(SNIPPET_CHARS).collect::<String>();
    out.push_str("...");
    out
}
