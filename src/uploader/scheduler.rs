// 多文件上传调度器
//
// 固定数量的 worker 从共享 FIFO 队列取文件，队列取空即退出。
// worker 在调用方任务内协作执行（不 spawn），同时进行的上传数不超过并发上限。
//
// 每个文件：
// 0. 出队前已取消的文件直接以取消结束
// 1. 查找远程文件 ID（找不到直接失败，不发请求）
// 2. 可选：计算 MD5
// 3. 交给 UploadEngine（直接上传或分片上传）
// 4. 通过回调上报结果，单个文件失败不影响其他文件

use crate::api::{RemoteFileRecord, UploadApi};
use crate::config::UploadConfig;
use crate::uploader::{
    ContentHasher, FileOutcome, FileTransferRecord, FileUploadContext, ProgressStage,
    UploadEngine, UploadError, UploadObserver, UploadOptions, UploadSummary, UploadableFile,
};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 默认最大同时上传文件数
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 3;

/// 多文件上传调度器
///
/// 同一时间只应运行一个批次
pub struct MultiFileScheduler {
    engine: UploadEngine,
    max_concurrent: usize,
    /// 上传前计算 MD5（用于完整性记录）
    hasher: Option<ContentHasher>,
    /// 当前批次的取消令牌
    batch: Mutex<CancellationToken>,
    /// 文件序号 -> (文件名, 取消令牌)
    tokens: DashMap<usize, (String, CancellationToken)>,
    /// 文件序号 -> 上传记录（登记时创建）
    records: DashMap<usize, Arc<Mutex<FileTransferRecord>>>,
    active: AtomicUsize,
}

impl MultiFileScheduler {
    pub fn new(api: Arc<dyn UploadApi>, options: UploadOptions, max_concurrent: usize) -> Self {
        Self {
            engine: UploadEngine::new(api, options),
            max_concurrent: max_concurrent.max(1),
            hasher: None,
            batch: Mutex::new(CancellationToken::new()),
            tokens: DashMap::new(),
            records: DashMap::new(),
            active: AtomicUsize::new(0),
        }
    }

    pub fn from_config(api: Arc<dyn UploadApi>, config: &UploadConfig) -> Self {
        Self::new(
            api,
            UploadOptions::from_config(config),
            config.concurrency(),
        )
    }

    /// 上传前先计算每个文件的 MD5
    pub fn with_content_hashing(mut self, hasher: ContentHasher) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 正在上传的文件数
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 开始新批次，返回批次取消令牌
    ///
    /// 上一批次遗留的令牌和记录一并清除
    pub fn begin_batch(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.batch.lock() = token.clone();
        self.tokens.clear();
        self.records.clear();
        token
    }

    /// 登记文件：创建取消令牌（批次令牌的子令牌）和排队中的上传记录
    ///
    /// 已登记的文件保持不变，登记后即可按序号或文件名取消
    pub fn register_files<'a>(
        &self,
        files: impl IntoIterator<Item = (usize, &'a UploadableFile)>,
        remote_ids: &HashMap<String, String>,
        batch: &CancellationToken,
    ) {
        for (index, file) in files {
            self.tokens
                .entry(index)
                .or_insert_with(|| (file.name().to_string(), batch.child_token()));
            self.records.entry(index).or_insert_with(|| {
                Arc::new(Mutex::new(FileTransferRecord::new(
                    index,
                    file,
                    remote_ids.get(file.name()).cloned(),
                )))
            });
        }
    }

    /// 文件的取消令牌
    pub(crate) fn file_token(&self, index: usize) -> Option<CancellationToken> {
        self.tokens.get(&index).map(|entry| entry.value().1.clone())
    }

    /// 文件的上传记录
    pub(crate) fn record_handle(&self, index: usize) -> Option<Arc<Mutex<FileTransferRecord>>> {
        self.records.get(&index).map(|r| r.value().clone())
    }

    /// 取消单个文件（不影响其他文件）
    pub fn cancel_file(&self, index: usize) -> bool {
        match self.tokens.get(&index) {
            Some(entry) => {
                entry.value().1.cancel();
                info!("取消文件上传: index={}, 文件={}", index, entry.value().0);
                true
            }
            None => false,
        }
    }

    /// 按文件名取消，返回取消的文件数
    pub fn cancel_file_by_name(&self, file_name: &str) -> usize {
        let mut cancelled = 0;
        for entry in self.tokens.iter() {
            if entry.value().0 == file_name {
                entry.value().1.cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!("按文件名取消上传: 文件={}, 数量={}", file_name, cancelled);
        }
        cancelled
    }

    /// 取消当前批次的所有文件
    pub fn cancel_all(&self) {
        info!("取消全部上传");
        self.batch.lock().cancel();
    }

    /// 上传记录快照（文件尚未登记或批次已结束时为 None）
    pub fn record(&self, index: usize) -> Option<FileTransferRecord> {
        self.records.get(&index).map(|r| r.value().lock().clone())
    }

    /// 上传一批文件
    ///
    /// 所有文件进入终态后触发一次 on_all_complete，并返回汇总
    pub async fn upload_files(
        &self,
        task_id: &str,
        files: Vec<UploadableFile>,
        remote_ids: &HashMap<String, String>,
        observer: Arc<dyn UploadObserver>,
    ) -> UploadSummary {
        let batch = self.begin_batch();
        let outcomes = self
            .run_files(
                task_id,
                files.into_iter().enumerate().collect(),
                remote_ids,
                observer.clone(),
                &batch,
            )
            .await;

        let summary = UploadSummary::from_outcomes(outcomes);
        info!(
            "批次上传结束: 任务={}, 总数={}, 成功={}, 失败={}",
            task_id, summary.total, summary.completed, summary.failed
        );
        observer.on_all_complete(&summary);
        summary
    }

    /// 上传带序号的文件，返回每个文件的结果（不触发 on_all_complete）
    pub async fn run_files(
        &self,
        task_id: &str,
        files: Vec<(usize, UploadableFile)>,
        remote_ids: &HashMap<String, String>,
        observer: Arc<dyn UploadObserver>,
        batch: &CancellationToken,
    ) -> Vec<FileOutcome> {
        let total = files.len();
        self.register_files(
            files.iter().map(|(index, file)| (*index, file)),
            remote_ids,
            batch,
        );

        let workers = self.max_concurrent.min(total);
        info!(
            "开始调度上传: 任务={}, 文件数={}, 并发数={}",
            task_id, total, workers
        );

        let queue = Mutex::new(VecDeque::from(files));
        let outcomes = Mutex::new(Vec::with_capacity(total));

        join_all(
            (0..workers).map(|_| self.worker(task_id, &queue, remote_ids, &observer, &outcomes)),
        )
        .await;

        // 批次结束，记录随结果一起交给上层
        self.tokens.clear();
        self.records.clear();

        outcomes.into_inner()
    }

    async fn worker(
        &self,
        task_id: &str,
        queue: &Mutex<VecDeque<(usize, UploadableFile)>>,
        remote_ids: &HashMap<String, String>,
        observer: &Arc<dyn UploadObserver>,
        outcomes: &Mutex<Vec<FileOutcome>>,
    ) {
        loop {
            let next = queue.lock().pop_front();
            let Some((index, file)) = next else {
                break;
            };

            self.active.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .upload_one(task_id, index, file, remote_ids, observer)
                .await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            outcomes.lock().push(outcome);
        }
    }

    async fn upload_one(
        &self,
        task_id: &str,
        index: usize,
        file: UploadableFile,
        remote_ids: &HashMap<String, String>,
        observer: &Arc<dyn UploadObserver>,
    ) -> FileOutcome {
        let remote_id = remote_ids.get(file.name()).cloned();
        let record = match self.record_handle(index) {
            Some(record) => record,
            None => {
                let record = Arc::new(Mutex::new(FileTransferRecord::new(
                    index,
                    &file,
                    remote_id.clone(),
                )));
                self.records.insert(index, record.clone());
                record
            }
        };

        let cancel = self
            .file_token(index)
            .unwrap_or_else(|| self.batch.lock().child_token());

        observer.on_file_start(index, &file);

        // 出队前已被取消（排队中或流程的哈希阶段）
        if cancel.is_cancelled() {
            let err = UploadError::Cancelled;
            record.lock().mark_cancelled();
            warn!("文件上传已取消: index={}, 文件={}", index, file.name());
            observer.on_file_error(index, &file, &err);
            return FileOutcome::errored(index, file.name(), &err);
        }

        let Some(remote_id) = remote_id else {
            let err = UploadError::MissingRemoteId(file.name().to_string());
            error!("{}", err);
            record.lock().mark_failed(err.to_string());
            observer.on_file_error(index, &file, &err);
            return FileOutcome::errored(index, file.name(), &err);
        };

        let ctx = FileUploadContext::new(
            index,
            file.clone(),
            remote_id,
            cancel,
            observer.clone(),
            record.clone(),
        );

        match self.transfer(task_id, &ctx).await {
            Ok(remote) => {
                record.lock().mark_completed(remote.instant_upload);
                info!("文件上传成功: index={}, 文件={}", index, file.name());
                observer.on_file_complete(index, &file, &remote);
                FileOutcome::completed(index, file.name(), remote)
            }
            Err(err) => {
                if err.is_cancelled() {
                    record.lock().mark_cancelled();
                    warn!("文件上传已取消: index={}, 文件={}", index, file.name());
                } else {
                    record.lock().mark_failed(err.to_string());
                    error!(
                        "文件上传失败: index={}, 文件={}, 错误={}",
                        index,
                        file.name(),
                        err
                    );
                }
                observer.on_file_error(index, &file, &err);
                FileOutcome::errored(index, file.name(), &err)
            }
        }
    }

    async fn transfer(
        &self,
        task_id: &str,
        ctx: &FileUploadContext,
    ) -> Result<RemoteFileRecord, UploadError> {
        if let Some(hasher) = &self.hasher {
            ctx.record().lock().mark_hashing();
            let digest = hasher
                .digest(ctx.file(), ctx.cancel_token(), |p| {
                    ctx.report_progress(ProgressStage::Md5, p)
                })
                .await?;
            ctx.record().lock().content_md5 = Some(digest.to_string());
        }

        self.engine.upload(task_id, ctx).await
    }
}
