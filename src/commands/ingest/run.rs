use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::{IngestArgs, default_db_path};
use crate::model::{DocumentEntry, Fragment, IngestCounts, IngestRunManifest};
use crate::retrieval::DB_SCHEMA_VERSION;
use crate::semantic::{Embedder, LocalHashEmbedder};
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
};

use super::INGEST_MANIFEST_VERSION;
use super::chunking::chunk_text;
use super::extract::{discover_pdfs, extract_pages_with_pdftotext};
use super::persist::{CorpusSnapshot, embed_fragments, replace_corpus};

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    if args.chunk_overlap >= args.chunk_size {
        bail!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            args.chunk_overlap,
            args.chunk_size
        );
    }

    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    let manifest_path = manifest_dir.join("ingest_run.json");
    let db_path = default_db_path(&args.cache_root, args.db_path.as_ref());
    if let Some(parent) = db_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        ensure_directory(parent)?;
    }

    info!(
        data_dir = %args.data_dir.display(),
        db_path = %db_path.display(),
        run_id = %run_id,
        "starting ingest"
    );

    let pdfs = discover_pdfs(&args.data_dir)?;
    let mut warnings = Vec::<String>::new();
    if pdfs.is_empty() {
        warn!(data_dir = %args.data_dir.display(), "no PDF files found; corpus will be empty");
        warnings.push(format!("no PDF files found in {}", args.data_dir.display()));
    }

    let mut documents = Vec::<DocumentEntry>::new();
    let mut fragments = Vec::<Fragment>::new();
    let mut page_count = 0usize;
    let mut empty_page_count = 0usize;

    for pdf_path in &pdfs {
        let filename = pdf_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf_path.display().to_string());

        let pages = match extract_pages_with_pdftotext(pdf_path, args.max_pages_per_doc) {
            Ok(pages) => pages,
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(pdf = %filename, error = %reason, "skipping unreadable PDF");
                warnings.push(format!("{filename}: {reason}"));
                continue;
            }
        };
        let sha256 = sha256_file(pdf_path)?;

        let fragments_before = fragments.len();
        for (page_index, page_text) in pages.iter().enumerate() {
            let chunks = chunk_text(page_text, args.chunk_size, args.chunk_overlap);
            if chunks.is_empty() {
                empty_page_count += 1;
            }
            fragments.extend(
                chunks
                    .into_iter()
                    .map(|chunk| Fragment::new(filename.as_str(), page_index as u32, chunk)),
            );
        }

        page_count += pages.len();
        let fragment_count = fragments.len() - fragments_before;
        info!(
            pdf = %filename,
            pages = pages.len(),
            fragments = fragment_count,
            "extracted document"
        );
        documents.push(DocumentEntry {
            filename,
            sha256,
            page_count: pages.len(),
            fragment_count,
        });
    }

    let embedder = LocalHashEmbedder::new(&args.model_id, args.embedding_dim);
    let embeddings = embed_fragments(&embedder, &fragments, args.batch_size)?;

    let mut connection = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    replace_corpus(
        &mut connection,
        &CorpusSnapshot {
            documents: &documents,
            fragments: &fragments,
            embeddings: &embeddings,
            model_id: embedder.model_id(),
            embedding_dim: embedder.dimensions(),
            ingested_at: &started_at,
        },
    )?;

    let counts = IngestCounts {
        pdf_count: documents.len(),
        page_count,
        empty_page_count,
        fragment_count: fragments.len(),
        embedded_fragment_count: embeddings.len(),
    };
    let manifest = IngestRunManifest {
        manifest_version: INGEST_MANIFEST_VERSION,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: if warnings.is_empty() {
            "completed".to_string()
        } else {
            "completed_with_warnings".to_string()
        },
        started_at,
        updated_at: now_utc_string(),
        data_dir: args.data_dir.display().to_string(),
        db_path: db_path.display().to_string(),
        model_id: embedder.model_id().to_string(),
        embedding_dim: embedder.dimensions(),
        chunk_size: args.chunk_size,
        chunk_overlap: args.chunk_overlap,
        counts,
        documents,
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %run_id,
        pdfs = manifest.counts.pdf_count,
        pages = manifest.counts.page_count,
        empty_pages = manifest.counts.empty_page_count,
        fragments = manifest.counts.fragment_count,
        warnings = manifest.warnings.len(),
        manifest = %manifest_path.display(),
        "ingest completed"
    );

    Ok(())
}
