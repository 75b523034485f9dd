use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::{StatusArgs, default_db_path};
use crate::model::IngestRunSnapshot;
use crate::retrieval::{active_model_id, open_read_only};
use crate::util::read_json;

#[derive(Debug, Default, PartialEq, Eq)]
struct CorpusCounts {
    documents: i64,
    fragments: i64,
    embeddings: i64,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_path = args.cache_root.join("manifests").join("ingest_run.json");
    let db_path = default_db_path(&args.cache_root, args.db_path.as_ref());

    info!(cache_root = %args.cache_root.display(), "status requested");

    if manifest_path.exists() {
        let snapshot: IngestRunSnapshot = read_json(&manifest_path)?;
        info!(
            run_id = %snapshot.run_id.unwrap_or_default(),
            status = %snapshot.status.unwrap_or_default(),
            updated_at = %snapshot.updated_at.unwrap_or_default(),
            model_id = %snapshot.model_id.unwrap_or_default(),
            warnings = snapshot.warnings.map(|warnings| warnings.len()).unwrap_or(0),
            "loaded ingest manifest"
        );
    } else {
        warn!(path = %manifest_path.display(), "ingest manifest missing");
    }

    if db_path.exists() {
        let connection = open_read_only(&db_path)?;
        let counts = corpus_counts(&connection);
        let model_id = active_model_id(&connection).ok().flatten();

        info!(
            path = %db_path.display(),
            documents = counts.documents,
            fragments = counts.fragments,
            embeddings = counts.embeddings,
            active_model_id = %model_id.unwrap_or_default(),
            "database status"
        );
        if counts.embeddings != counts.fragments {
            warn!(
                fragments = counts.fragments,
                embeddings = counts.embeddings,
                "embedding coverage incomplete; re-run ingest"
            );
        }
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

fn corpus_counts(connection: &Connection) -> CorpusCounts {
    CorpusCounts {
        documents: query_count(connection, "SELECT COUNT(*) FROM documents").unwrap_or(0),
        fragments: query_count(connection, "SELECT COUNT(*) FROM fragments").unwrap_or(0),
        embeddings: query_count(connection, "SELECT COUNT(*) FROM fragment_embeddings")
            .unwrap_or(0),
    }
}

fn query_count(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
