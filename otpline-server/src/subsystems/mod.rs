pub mod ingest;
pub mod latest;
pub mod provision;
pub mod recorder;
pub mod resolver;
pub mod sweep;
pub mod transition;
