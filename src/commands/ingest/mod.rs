mod chunking;
mod extract;
mod persist;
mod run;

pub use run::run;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const INGEST_MANIFEST_VERSION: u32 = 1;
