use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::model::Fragment;
use crate::semantic::decode_embedding_blob;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

/// Immutable, index-addressable corpus loaded once before any retrieval call.
#[derive(Debug, Clone, Default)]
pub struct FragmentStore {
    fragments: Vec<Fragment>,
}

impl FragmentStore {
    pub fn from_fragments(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    pub fn load(connection: &Connection) -> Result<Self> {
        let mut statement = connection.prepare(
            "
            SELECT source_document, page_index, text
            FROM fragments
            ORDER BY fragment_idx ASC
            ",
        )?;

        let fragments = statement
            .query_map([], |row| {
                Ok(Fragment {
                    source_document: row.get(0)?,
                    page_index: row.get(1)?,
                    text: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<Fragment>>>()
            .context("failed to load fragments")?;

        Ok(Self { fragments })
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Fragment> {
        self.fragments.get(index)
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }
}

pub fn open_read_only(db_path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open database read-only: {}", db_path.display()))
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
              filename TEXT PRIMARY KEY,
              sha256 TEXT NOT NULL,
              page_count INTEGER NOT NULL,
              fragment_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fragments (
              fragment_idx INTEGER PRIMARY KEY,
              source_document TEXT NOT NULL,
              page_index INTEGER NOT NULL,
              text TEXT NOT NULL,
              FOREIGN KEY(source_document) REFERENCES documents(filename)
            );

            CREATE TABLE IF NOT EXISTS embedding_models (
              model_id TEXT PRIMARY KEY,
              dimensions INTEGER NOT NULL,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fragment_embeddings (
              fragment_idx INTEGER NOT NULL,
              model_id TEXT NOT NULL,
              embedding BLOB NOT NULL,
              embedding_dim INTEGER NOT NULL,
              PRIMARY KEY(fragment_idx, model_id),
              FOREIGN KEY(fragment_idx) REFERENCES fragments(fragment_idx),
              FOREIGN KEY(model_id) REFERENCES embedding_models(model_id)
            );
            ",
        )
        .context("failed to create corpus schema")?;

    connection.execute(
        "
        INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
        ON CONFLICT(key) DO UPDATE SET value=excluded.value
        ",
        [DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

pub fn active_model_id(connection: &Connection) -> Result<Option<String>> {
    let value = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'active_model_id'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

pub fn load_embeddings(
    connection: &Connection,
    model_id: &str,
    expected_dim: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut statement = connection.prepare(
        "
        SELECT fe.fragment_idx, fe.embedding, fe.embedding_dim
        FROM fragment_embeddings fe
        WHERE fe.model_id = ?1
        ORDER BY fe.fragment_idx ASC
        ",
    )?;

    let mut rows = statement.query(params![model_id])?;
    let mut out = Vec::<Vec<f32>>::new();
    while let Some(row) = rows.next()? {
        let fragment_idx = row.get::<_, i64>(0)?;
        let embedding_dim = row.get::<_, i64>(2)? as usize;
        let blob = row.get::<_, Vec<u8>>(1)?;

        if fragment_idx != out.len() as i64 {
            anyhow::bail!(
                "embedding rows for model '{model_id}' are not contiguous at fragment {fragment_idx}"
            );
        }
        if embedding_dim != expected_dim {
            anyhow::bail!(
                "fragment {fragment_idx} has embedding_dim {embedding_dim}, expected {expected_dim}"
            );
        }

        let Some(vector) = decode_embedding_blob(&blob, expected_dim) else {
            anyhow::bail!("fragment {fragment_idx} has a malformed embedding blob");
        };
        out.push(vector);
    }

    Ok(out)
}
