// 测试用的内存后端

use crate::api::{
    ChunkReceipt, CompletedPart, ExistingFile, InitMultipartRequest, InitMultipartResponse,
    InstantCheckEntry, InstantCheckResult, RemoteFileRecord, TaskFileEntry, TransferPayload,
    TransferProgress, UploadApi,
};
use crate::uploader::UploadError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 记录的后端调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiCall {
    CheckInstant { files: usize },
    UploadDirect { file_id: String, size: u64 },
    InitMultipart { file_id: String, file_size: u64 },
    UploadChunk { file_id: String, part_number: u32, size: u64 },
    CompleteMultipart { file_id: String, parts: Vec<u32> },
    ListTaskFiles,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<ApiCall>>,
    existing: Mutex<Vec<ExistingFile>>,
    task_files: Mutex<Vec<TaskFileEntry>>,
    fail_check: AtomicBool,
    fail_list: AtomicBool,
    fail_init: Mutex<HashSet<String>>,
    fail_complete: Mutex<HashSet<String>>,
    chunk_failures: Mutex<HashMap<(String, u32), u32>>,
    direct_failures: Mutex<HashMap<String, u32>>,
    delays: Mutex<HashMap<String, Duration>>,
    default_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, file_id: &str) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| match c {
                ApiCall::UploadDirect { file_id: id, .. }
                | ApiCall::InitMultipart { file_id: id, .. }
                | ApiCall::UploadChunk { file_id: id, .. }
                | ApiCall::CompleteMultipart { file_id: id, .. } => id == file_id,
                _ => false,
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_existing(&self, files: Vec<ExistingFile>) {
        *self.existing.lock() = files;
    }

    pub fn set_task_files(&self, files: &[(&str, &str)]) {
        *self.task_files.lock() = files
            .iter()
            .map(|(id, name)| TaskFileEntry {
                id: Value::from(*id),
                file_name: name.to_string(),
                file_size: None,
            })
            .collect();
    }

    pub fn fail_instant_check(&self) {
        self.fail_check.store(true, Ordering::SeqCst);
    }

    pub fn fail_list_files(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn fail_init_for(&self, file_id: &str) {
        self.fail_init.lock().insert(file_id.to_string());
    }

    pub fn fail_complete_for(&self, file_id: &str) {
        self.fail_complete.lock().insert(file_id.to_string());
    }

    /// 指定分片前 `times` 次上传失败
    pub fn fail_chunk(&self, file_id: &str, part_number: u32, times: u32) {
        self.chunk_failures
            .lock()
            .insert((file_id.to_string(), part_number), times);
    }

    /// 直接上传前 `times` 次失败
    pub fn fail_direct(&self, file_id: &str, times: u32) {
        self.direct_failures
            .lock()
            .insert(file_id.to_string(), times);
    }

    /// 每次传输的耗时
    pub fn set_delay(&self, delay: Duration) {
        *self.default_delay.lock() = delay;
    }

    pub fn set_delay_for(&self, file_id: &str, delay: Duration) {
        self.delays.lock().insert(file_id.to_string(), delay);
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }

    fn take_failure<K: std::hash::Hash + Eq>(map: &Mutex<HashMap<K, u32>>, key: &K) -> bool {
        let mut map = map.lock();
        match map.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    async fn transfer(
        &self,
        file_id: &str,
        progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        progress(50);

        let delay = self
            .delays
            .lock()
            .get(file_id)
            .copied()
            .unwrap_or(*self.default_delay.lock());

        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Ok(())
    }
}

#[async_trait]
impl UploadApi for FakeApi {
    async fn check_instant(
        &self,
        _task_id: &str,
        files: &[InstantCheckEntry],
    ) -> Result<InstantCheckResult, UploadError> {
        self.record(ApiCall::CheckInstant { files: files.len() });
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(UploadError::Network("模拟网络错误".to_string()));
        }

        let known = self.existing.lock().clone();
        let existing: Vec<ExistingFile> = known
            .into_iter()
            .filter(|e| {
                files
                    .iter()
                    .any(|f| f.file_name == e.file_name && e.md5.as_ref().map_or(true, |m| *m == f.md5))
            })
            .collect();
        let storage_saved = files
            .iter()
            .filter(|f| existing.iter().any(|e| e.file_name == f.file_name))
            .map(|f| f.file_size)
            .sum();

        Ok(InstantCheckResult {
            new_files_count: files.len() - existing.len(),
            existing_files: existing,
            storage_saved,
        })
    }

    async fn upload_direct(
        &self,
        _task_id: &str,
        remote_file_id: &str,
        payload: TransferPayload,
        progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<RemoteFileRecord, UploadError> {
        self.record(ApiCall::UploadDirect {
            file_id: remote_file_id.to_string(),
            size: payload.len(),
        });
        self.transfer(remote_file_id, progress, cancel).await?;

        if Self::take_failure(&self.direct_failures, &remote_file_id.to_string()) {
            return Err(UploadError::Transfer {
                status: 503,
                message: "模拟服务不可用".to_string(),
            });
        }

        progress(100);
        Ok(RemoteFileRecord {
            id: Some(Value::from(remote_file_id)),
            file_name: Some(payload.file_name),
            ..Default::default()
        })
    }

    async fn init_multipart(
        &self,
        _task_id: &str,
        remote_file_id: &str,
        request: &InitMultipartRequest,
    ) -> Result<InitMultipartResponse, UploadError> {
        self.record(ApiCall::InitMultipart {
            file_id: remote_file_id.to_string(),
            file_size: request.file_size,
        });
        if self.fail_init.lock().contains(remote_file_id) {
            return Err(UploadError::Transfer {
                status: 500,
                message: "模拟初始化失败".to_string(),
            });
        }
        Ok(InitMultipartResponse {
            upload_id: format!("upload-{}", remote_file_id),
        })
    }

    async fn upload_chunk(
        &self,
        _task_id: &str,
        remote_file_id: &str,
        _upload_id: &str,
        part_number: u32,
        payload: TransferPayload,
        progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<ChunkReceipt, UploadError> {
        self.record(ApiCall::UploadChunk {
            file_id: remote_file_id.to_string(),
            part_number,
            size: payload.len(),
        });
        self.transfer(remote_file_id, progress, cancel).await?;

        if Self::take_failure(
            &self.chunk_failures,
            &(remote_file_id.to_string(), part_number),
        ) {
            return Err(UploadError::Network("模拟连接重置".to_string()));
        }

        progress(100);
        Ok(ChunkReceipt {
            etag: format!("etag-{}-{}", remote_file_id, part_number),
        })
    }

    async fn complete_multipart(
        &self,
        _task_id: &str,
        remote_file_id: &str,
        _upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<RemoteFileRecord, UploadError> {
        self.record(ApiCall::CompleteMultipart {
            file_id: remote_file_id.to_string(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        if self.fail_complete.lock().contains(remote_file_id) {
            return Err(UploadError::Transfer {
                status: 500,
                message: "模拟合并失败".to_string(),
            });
        }
        Ok(RemoteFileRecord {
            id: Some(Value::from(remote_file_id)),
            ..Default::default()
        })
    }

    async fn list_task_files(&self, _task_id: &str) -> Result<Vec<TaskFileEntry>, UploadError> {
        self.record(ApiCall::ListTaskFiles);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(UploadError::Network("模拟网络错误".to_string()));
        }
        Ok(self.task_files.lock().clone())
    }
}
