// Yuntu Uploader Library
// 云图上传核心库：内容哈希、秒传检测、分片上传、多文件调度

// 认证凭据
pub mod auth;

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 后端上传接口
pub mod api;

// 上传核心模块
pub mod uploader;

// 导出常用类型
pub use api::{ApiClient, UploadApi};
pub use auth::{SharedToken, StaticToken, TokenProvider};
pub use config::AppConfig;
pub use logging::{init_logging, LogGuard};
pub use uploader::{
    fetch_remote_ids, ContentHasher, EventForwarder, MultiFileScheduler, UploadError,
    UploadEvent, UploadObserver, UploadPipeline, UploadSummary, UploadableFile,
};
