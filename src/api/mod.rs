// 后端上传接口
//
// 上传核心只通过 UploadApi 访问后端，生产环境使用基于 reqwest 的 ApiClient

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::ApiClient;
pub use endpoints::ApiEndpoints;
pub use types::{
    ChunkReceipt, CompletedPart, ExistingFile, InitMultipartRequest, InitMultipartResponse,
    InstantCheckEntry, InstantCheckResult, RemoteFileRecord, TaskFileEntry, TransferPayload,
};

use crate::uploader::UploadError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// 传输进度回调（本次载荷的百分比 0-100）
pub type TransferProgress<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// 上传核心依赖的后端操作
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// 秒传检测：返回服务器已存在的文件
    async fn check_instant(
        &self,
        task_id: &str,
        files: &[InstantCheckEntry],
    ) -> Result<InstantCheckResult, UploadError>;

    /// 小文件直接上传（整个文件一次请求）
    async fn upload_direct(
        &self,
        task_id: &str,
        remote_file_id: &str,
        payload: TransferPayload,
        progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<RemoteFileRecord, UploadError>;

    /// 初始化分片上传，返回 upload_id
    async fn init_multipart(
        &self,
        task_id: &str,
        remote_file_id: &str,
        request: &InitMultipartRequest,
    ) -> Result<InitMultipartResponse, UploadError>;

    /// 上传单个分片，返回分片凭证
    #[allow(clippy::too_many_arguments)]
    async fn upload_chunk(
        &self,
        task_id: &str,
        remote_file_id: &str,
        upload_id: &str,
        part_number: u32,
        payload: TransferPayload,
        progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<ChunkReceipt, UploadError>;

    /// 按分片号顺序提交所有分片凭证，合并为完整文件
    async fn complete_multipart(
        &self,
        task_id: &str,
        remote_file_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<RemoteFileRecord, UploadError>;

    /// 任务下的文件列表（文件名 → fileId 映射来源）
    async fn list_task_files(&self, task_id: &str) -> Result<Vec<TaskFileEntry>, UploadError>;
}
