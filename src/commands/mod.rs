pub mod ask;
pub mod evaluate;
pub mod ingest;
pub mod query;
pub mod status;
