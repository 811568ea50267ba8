// 单文件上传引擎
//
// 根据文件大小选择上传方式：
// - 小文件：整个文件一次请求直接上传（默认不重试）
// - 大文件：交给 LargeFileUploadSession 分片上传

use crate::api::{RemoteFileRecord, TransferPayload, UploadApi};
use crate::config::UploadConfig;
use crate::uploader::{
    FileUploadContext, LargeFileUploadSession, ProgressStage, RetryPolicy, UploadError,
    UploadStrategy, DEFAULT_CHUNK_SIZE, DEFAULT_LARGE_FILE_THRESHOLD,
};
use std::sync::Arc;
use tracing::{info, warn};

/// 单文件上传参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// 分片大小
    pub chunk_size: u64,
    /// 大文件阈值（大于等于该值分片上传）
    pub large_file_threshold: u64,
    /// 分片重试策略
    pub retry: RetryPolicy,
    /// 直接上传最多尝试次数，1 表示失败即放弃
    pub direct_attempts: u32,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            retry: RetryPolicy::default(),
            direct_attempts: 1,
        }
    }
}

impl UploadOptions {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            chunk_size: config.chunk_size(),
            large_file_threshold: config.large_file_threshold(),
            retry: RetryPolicy::from_config(config),
            direct_attempts: config.direct_attempts(),
        }
    }
}

/// 单文件上传引擎
#[derive(Clone)]
pub struct UploadEngine {
    api: Arc<dyn UploadApi>,
    options: UploadOptions,
}

impl UploadEngine {
    pub fn new(api: Arc<dyn UploadApi>, options: UploadOptions) -> Self {
        Self { api, options }
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// 上传一个文件
    pub async fn upload(
        &self,
        task_id: &str,
        ctx: &FileUploadContext,
    ) -> Result<RemoteFileRecord, UploadError> {
        if ctx.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let strategy =
            UploadStrategy::select(ctx.file().size(), self.options.large_file_threshold);
        ctx.record().lock().mark_uploading(strategy);

        match strategy {
            UploadStrategy::Direct => self.upload_direct(task_id, ctx).await,
            UploadStrategy::Chunked => {
                LargeFileUploadSession::new(
                    self.api.as_ref(),
                    task_id,
                    ctx,
                    self.options.chunk_size,
                    self.options.retry,
                )
                .run()
                .await
            }
        }
    }

    /// 小文件直接上传
    async fn upload_direct(
        &self,
        task_id: &str,
        ctx: &FileUploadContext,
    ) -> Result<RemoteFileRecord, UploadError> {
        let file = ctx.file();
        let cancel = ctx.cancel_token();

        info!(
            "开始直接上传: 文件={}, 大小={} bytes",
            file.name(),
            file.size()
        );

        let data = file
            .read_range(0..file.size())
            .await
            .map_err(|e| UploadError::read(file.name(), e))?;

        let progress = |value: u8| ctx.report_progress(ProgressStage::Upload, value);
        let max_attempts = self.options.direct_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let payload = TransferPayload {
                file_name: file.name().to_string(),
                content_type: file.content_type().to_string(),
                data: data.clone(),
            };

            let err = match self
                .api
                .upload_direct(task_id, ctx.remote_file_id(), payload, &progress, cancel)
                .await
            {
                Ok(record) => {
                    ctx.set_bytes_sent(file.size());
                    info!("直接上传完成: 文件={}", file.name());
                    return Ok(record);
                }
                Err(e) => e,
            };

            if err.is_cancelled() || !err.is_retriable() || attempt >= max_attempts {
                return Err(err);
            }

            warn!(
                "直接上传失败，{}ms 后重试 ({}/{}): 文件={}, 错误={}",
                self.options.retry.delay.as_millis(),
                attempt,
                max_attempts,
                file.name(),
                err
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(self.options.retry.delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::test_support::{ApiCall, FakeApi};
    use crate::uploader::{FileStage, NoopObserver, UploadableFile};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn ctx(size: usize) -> FileUploadContext {
        FileUploadContext::standalone(
            UploadableFile::from_bytes("a.bin", vec![1u8; size], ""),
            "f1",
            CancellationToken::new(),
            Arc::new(NoopObserver),
        )
    }

    fn options(direct_attempts: u32) -> UploadOptions {
        UploadOptions {
            chunk_size: 1024,
            large_file_threshold: 1024,
            retry: RetryPolicy::new(3, Duration::from_millis(5)),
            direct_attempts,
        }
    }

    #[tokio::test]
    async fn test_small_file_uses_direct_upload() {
        let api = Arc::new(FakeApi::new());
        let engine = UploadEngine::new(api.clone(), options(1));
        let ctx = ctx(1023);

        engine.upload("t1", &ctx).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![ApiCall::UploadDirect {
                file_id: "f1".into(),
                size: 1023
            }]
        );
        assert_eq!(ctx.bytes_sent(), 1023);
        assert_eq!(ctx.record().lock().stage, FileStage::Uploading);
    }

    #[tokio::test]
    async fn test_threshold_size_uses_chunked_upload() {
        let api = Arc::new(FakeApi::new());
        let engine = UploadEngine::new(api.clone(), options(1));

        engine.upload("t1", &ctx(1024)).await.unwrap();

        assert!(matches!(api.calls()[0], ApiCall::InitMultipart { .. }));
    }

    #[tokio::test]
    async fn test_direct_upload_not_retried_by_default() {
        let api = Arc::new(FakeApi::new());
        api.fail_direct("f1", 1);
        let engine = UploadEngine::new(api.clone(), options(1));

        let err = engine.upload("t1", &ctx(10)).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_upload_retry_knob() {
        let api = Arc::new(FakeApi::new());
        api.fail_direct("f1", 1);
        let engine = UploadEngine::new(api.clone(), options(2));

        assert!(engine.upload("t1", &ctx(10)).await.is_ok());
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let api = Arc::new(FakeApi::new());
        let engine = UploadEngine::new(api.clone(), options(1));
        let ctx = ctx(10);
        ctx.cancel_token().cancel();

        assert!(matches!(
            engine.upload("t1", &ctx).await,
            Err(UploadError::Cancelled)
        ));
        assert!(api.calls().is_empty());
    }
}
