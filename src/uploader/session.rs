// 大文件分片上传会话
//
// 状态流转：Initiating → Transferring(i/N) → Completing → Completed
// 任何非终态都可能进入 Failed / Cancelled
//
// - 分片严格按分片号升序逐个上传
// - 单个分片失败按固定间隔重试，重试次数耗尽则整个文件失败
// - 已被服务器接收的分片不回滚，清理由服务端负责

use crate::api::{
    ChunkReceipt, CompletedPart, InitMultipartRequest, RemoteFileRecord, TransferPayload,
    UploadApi,
};
use crate::config::UploadConfig;
use crate::uploader::hasher::percent;
use crate::uploader::{
    ChunkDescriptor, ChunkPlan, FileUploadContext, ProgressStage, UploadError,
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 分片重试策略（固定间隔）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最多尝试次数（包括第一次）
    pub max_attempts: u32,
    /// 两次尝试之间的间隔
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.chunk_attempts(), config.chunk_retry_delay())
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initiating,
    Transferring { part_number: u32, total_parts: u32 },
    Completing,
    Completed,
    Failed,
    Cancelled,
}

/// 服务器端的分片上传会话
#[derive(Debug, Clone)]
pub struct MultipartSession {
    upload_id: String,
    parts: Vec<CompletedPart>,
}

impl MultipartSession {
    pub fn new(upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            parts: Vec::new(),
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// 已接收的分片（按分片号升序）
    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    fn record_part(&mut self, part_number: u32, etag: String) {
        self.parts.push(CompletedPart { part_number, etag });
    }
}

/// 单个大文件的分片上传
pub struct LargeFileUploadSession<'a> {
    api: &'a dyn UploadApi,
    task_id: &'a str,
    ctx: &'a FileUploadContext,
    plan: ChunkPlan,
    retry: RetryPolicy,
    state: SessionState,
}

impl<'a> LargeFileUploadSession<'a> {
    pub fn new(
        api: &'a dyn UploadApi,
        task_id: &'a str,
        ctx: &'a FileUploadContext,
        chunk_size: u64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            task_id,
            ctx,
            plan: ChunkPlan::new(ctx.file().size(), chunk_size),
            retry,
            state: SessionState::Initiating,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// 执行完整的分片上传流程
    pub async fn run(&mut self) -> Result<RemoteFileRecord, UploadError> {
        let result = self.run_inner().await;
        self.state = match &result {
            Ok(_) => SessionState::Completed,
            Err(e) if e.is_cancelled() => SessionState::Cancelled,
            Err(_) => SessionState::Failed,
        };
        result
    }

    async fn run_inner(&mut self) -> Result<RemoteFileRecord, UploadError> {
        let (api, task_id, ctx) = (self.api, self.task_id, self.ctx);
        let file = ctx.file();
        let cancel = ctx.cancel_token();

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        info!(
            "开始分片上传: 文件={}, 大小={} bytes, 分片数={}",
            file.name(),
            file.size(),
            self.plan.chunk_count()
        );

        // 1. 初始化
        self.state = SessionState::Initiating;
        let request = InitMultipartRequest {
            task_file_id: ctx.remote_file_id().to_string(),
            file_size: file.size(),
            file_name: file.name().to_string(),
            mime_type: file.content_type().to_string(),
        };
        let init = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = api.init_multipart(task_id, ctx.remote_file_id(), &request) => {
                result.map_err(|e| {
                    if e.is_cancelled() { e } else { UploadError::SessionInit(Box::new(e)) }
                })?
            }
        };
        let mut session = MultipartSession::new(init.upload_id);
        debug!("分片上传会话已创建: upload_id={}", session.upload_id());

        // 2. 逐个上传分片
        let total = self.plan.total_size();
        let total_parts = self.plan.chunk_count() as u32;
        let mut bytes_sent = 0u64;

        for chunk in self.plan.chunks() {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            self.state = SessionState::Transferring {
                part_number: chunk.part_number,
                total_parts,
            };

            let receipt = self
                .upload_chunk_with_retry(&session, chunk, bytes_sent)
                .await?;
            session.record_part(chunk.part_number, receipt.etag);

            bytes_sent = (bytes_sent + chunk.size()).min(total);
            ctx.set_bytes_sent(bytes_sent);
            ctx.report_progress(ProgressStage::Upload, percent(bytes_sent, total));

            debug!(
                "分片 {}/{} 上传完成: 文件={}, 已发送={}/{} bytes",
                chunk.part_number,
                total_parts,
                file.name(),
                bytes_sent,
                total
            );
        }

        // 3. 合并
        self.state = SessionState::Completing;
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = api.complete_multipart(
                task_id,
                ctx.remote_file_id(),
                session.upload_id(),
                session.parts(),
            ) => {
                result.map_err(|e| {
                    if e.is_cancelled() { e } else { UploadError::SessionComplete(Box::new(e)) }
                })?
            }
        };

        info!(
            "分片上传完成: 文件={}, 分片数={}",
            file.name(),
            session.parts().len()
        );

        Ok(record)
    }

    /// 上传单个分片，失败时按策略重试
    async fn upload_chunk_with_retry(
        &self,
        session: &MultipartSession,
        chunk: &ChunkDescriptor,
        bytes_before: u64,
    ) -> Result<ChunkReceipt, UploadError> {
        let file = self.ctx.file();
        let cancel = self.ctx.cancel_token();
        let total = self.plan.total_size();
        let chunk_len = chunk.size();

        // 分片数据只读取一次，重试时复用
        let data = file
            .read_range(chunk.range.clone())
            .await
            .map_err(|e| UploadError::read(file.name(), e))?;

        let progress = |value: u8| {
            let in_chunk = chunk_len * value.min(100) as u64 / 100;
            self.ctx
                .report_progress(ProgressStage::Upload, percent(bytes_before + in_chunk, total));
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let payload = TransferPayload {
                file_name: file.name().to_string(),
                content_type: file.content_type().to_string(),
                data: data.clone(),
            };

            let result = self
                .api
                .upload_chunk(
                    self.task_id,
                    self.ctx.remote_file_id(),
                    session.upload_id(),
                    chunk.part_number,
                    payload,
                    &progress,
                    cancel,
                )
                .await;

            let err = match result {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            if !err.is_retriable() || attempt >= self.retry.max_attempts {
                error!(
                    "分片 {} 上传失败: 文件={}, 已尝试 {} 次, 错误={}",
                    chunk.part_number,
                    file.name(),
                    attempt,
                    err
                );
                return Err(UploadError::ChunkUploadFailed {
                    part_number: chunk.part_number,
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            warn!(
                "分片 {} 上传失败，{}ms 后重试 ({}/{}): 文件={}, 错误={}",
                chunk.part_number,
                self.retry.delay.as_millis(),
                attempt,
                self.retry.max_attempts,
                file.name(),
                err
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(self.retry.delay) => {}
            }
        }
    }
}
