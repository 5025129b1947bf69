pub mod comparator;
pub mod engine;
pub mod fingerprint;
pub mod materialize;
pub mod remote;
pub mod scanner;

pub use comparator::{diff, summarize, DiffSummary, Direction, TaskRecord, TransferReason, TransferTask};
pub use engine::{ExecuteOutcome, SyncConfig, SyncEngine, SyncPhase, SyncPlan, SyncProgress, SyncReport};
pub use fingerprint::{fingerprint_file, hash_bytes, is_multipart_etag, quote_etag};
pub use materialize::{ensure_parent_dirs, local_target};
pub use remote::{fetch_remote_index, RemoteIndex, RemoteObjectRecord};
pub use scanner::{LocalFileRecord, LocalIndex, LocalIndexer, ScanConfig};
