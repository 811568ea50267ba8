// 上传核心模块
//
// - 内容哈希：按窗口增量计算 MD5
// - 秒传检测：已存在的文件不再传输，检测失败自动降级
// - 策略选择：小文件直接上传，大文件分片上传
// - 分片会话：逐片上传、固定间隔重试、合并
// - 多文件调度：固定数量 worker 共享队列，单文件失败不影响其他文件

pub mod chunk;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod file;
pub mod hasher;
pub mod instant;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod strategy;
pub mod task;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunk::{ChunkDescriptor, ChunkPlan, DEFAULT_CHUNK_SIZE};
pub use context::FileUploadContext;
pub use engine::{UploadEngine, UploadOptions};
pub use error::UploadError;
pub use events::{
    EventForwarder, FileOutcome, NoopObserver, ProgressStage, UploadEvent, UploadObserver,
    UploadSummary,
};
pub use file::{ByteSource, LocalFileSource, MemorySource, UploadableFile, DEFAULT_CONTENT_TYPE};
pub use hasher::{ContentDigest, ContentHasher, DEFAULT_HASH_WINDOW_SIZE};
pub use instant::InstantUploadChecker;
pub use pipeline::{fetch_remote_ids, UploadPipeline};
pub use scheduler::{MultiFileScheduler, DEFAULT_MAX_CONCURRENT_FILES};
pub use session::{LargeFileUploadSession, MultipartSession, RetryPolicy, SessionState};
pub use strategy::{UploadStrategy, DEFAULT_LARGE_FILE_THRESHOLD};
pub use task::{FileStage, FileTransferRecord};
pub use transport::ChunkTransport;
