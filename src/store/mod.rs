pub mod active_log;
pub mod archiver;
pub mod audit;
pub mod chunk;
pub mod config;
pub mod index;
pub mod ingest;
pub mod lock;
pub mod paths;
pub mod pool;
pub mod record;
pub mod snapshot;
pub mod stats;
pub mod util;
pub mod warn;
