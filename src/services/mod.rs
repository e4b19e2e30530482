// Service exports
pub mod ratings;
pub mod retrying;
pub mod storage;
pub mod transport;

pub use ratings::{BatchFetcher, FetchError, DEFAULT_API_URL, DEFAULT_MAX_BATCH_SIZE};
pub use retrying::{RetryError, RetryingTransport, DEFAULT_BACKOFF_BASE};
pub use storage::{read_battle_ids, write_outcome, BattleSummary, StorageError};
pub use transport::{RawRequest, RawResponse, ReqwestTransport, Transport, TransportError};
