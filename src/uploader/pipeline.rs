// 完整上传流程
//
// 1. 逐个计算文件 MD5（严格串行）
// 2. 批量秒传检测，已存在的文件直接完成
// 3. 其余文件交给调度器上传
// 4. 汇总所有文件结果，触发一次 on_all_complete

use crate::api::{InstantCheckEntry, RemoteFileRecord, UploadApi};
use crate::config::UploadConfig;
use crate::uploader::hasher::percent;
use crate::uploader::{
    ContentDigest, ContentHasher, FileOutcome, InstantUploadChecker, MultiFileScheduler,
    ProgressStage, UploadError, UploadObserver, UploadSummary, UploadableFile,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 获取任务的 文件名 -> fileId 映射
pub async fn fetch_remote_ids(
    api: &dyn UploadApi,
    task_id: &str,
) -> Result<HashMap<String, String>, UploadError> {
    let files = api.list_task_files(task_id).await?;
    let mut ids = HashMap::with_capacity(files.len());

    for entry in files {
        let id = entry.id_string();
        if let Some(previous) = ids.insert(entry.file_name.clone(), id) {
            warn!(
                "任务中存在同名文件，使用后出现的 fileId: 文件={}, 旧ID={}",
                entry.file_name, previous
            );
        }
    }

    info!("获取文件ID映射: 任务={}, 文件数={}", task_id, ids.len());
    Ok(ids)
}

/// 上传流程
pub struct UploadPipeline {
    scheduler: MultiFileScheduler,
    checker: InstantUploadChecker,
    hasher: ContentHasher,
    instant_upload: bool,
}

impl UploadPipeline {
    pub fn new(api: Arc<dyn UploadApi>, config: &UploadConfig) -> Self {
        Self {
            scheduler: MultiFileScheduler::from_config(api.clone(), config),
            checker: InstantUploadChecker::new(api),
            hasher: ContentHasher::new(config.hash_window()),
            instant_upload: config.instant_upload,
        }
    }

    /// 使用自定义调度器
    pub fn with_scheduler(
        api: Arc<dyn UploadApi>,
        scheduler: MultiFileScheduler,
        hasher: ContentHasher,
        instant_upload: bool,
    ) -> Self {
        Self {
            scheduler,
            checker: InstantUploadChecker::new(api),
            hasher,
            instant_upload,
        }
    }

    pub fn scheduler(&self) -> &MultiFileScheduler {
        &self.scheduler
    }

    /// 取消整个流程（包括尚未开始的哈希和上传）
    pub fn cancel_all(&self) {
        self.scheduler.cancel_all();
    }

    /// 串行计算所有文件的 MD5
    ///
    /// 每个文件使用调度器中登记的取消令牌（未登记时使用 `cancel` 的子令牌），
    /// 已登记的记录进入 hashing 阶段并保存 MD5。
    /// 计算失败的文件返回 None（不参与秒传检测，但仍会正常上传），
    /// 被取消的文件也返回 None
    pub async fn hash_files(
        &self,
        files: &[UploadableFile],
        cancel: &CancellationToken,
        observer: &dyn UploadObserver,
    ) -> Vec<Option<ContentDigest>> {
        let total = files.len() as u64;
        let mut digests = Vec::with_capacity(files.len());
        let mut last_batch = 0u8;

        for (index, file) in files.iter().enumerate() {
            let token = self
                .scheduler
                .file_token(index)
                .unwrap_or_else(|| cancel.child_token());
            if token.is_cancelled() {
                digests.push(None);
                continue;
            }

            let record = self.scheduler.record_handle(index);
            if let Some(record) = &record {
                record.lock().mark_hashing();
            }

            let done = index as u64;
            let result = self
                .hasher
                .digest(file, &token, |p| {
                    observer.on_file_progress(index, file, ProgressStage::Md5, p);
                    let batch = percent(done * 100 + p as u64, total * 100);
                    if batch > last_batch {
                        last_batch = batch;
                        observer.on_hash_batch_progress(batch);
                    }
                })
                .await;

            match result {
                Ok(digest) => {
                    if let Some(record) = &record {
                        record.lock().content_md5 = Some(digest.to_string());
                    }
                    digests.push(Some(digest));
                }
                Err(e) if e.is_cancelled() => {
                    info!("文件已取消，停止计算 MD5: 文件={}", file.name());
                    digests.push(None);
                }
                Err(e) => {
                    warn!("计算 MD5 失败，跳过秒传检测: 文件={}, 错误={}", file.name(), e);
                    digests.push(None);
                }
            }
        }

        digests
    }

    /// 执行完整流程
    pub async fn run(
        &self,
        task_id: &str,
        files: Vec<UploadableFile>,
        remote_ids: &HashMap<String, String>,
        observer: Arc<dyn UploadObserver>,
    ) -> UploadSummary {
        let batch = self.scheduler.begin_batch();
        let total = files.len();
        // 哈希开始前登记，整个流程中都可以取消单个文件
        self.scheduler
            .register_files(files.iter().enumerate(), remote_ids, &batch);

        info!(
            "开始上传流程: 任务={}, 文件数={}, 秒传检测={}",
            task_id, total, self.instant_upload
        );

        let mut pending = Vec::with_capacity(total);
        let mut outcomes = Vec::with_capacity(total);

        if self.instant_upload && total > 0 {
            let digests = self.hash_files(&files, &batch, observer.as_ref()).await;

            let entries: Vec<InstantCheckEntry> = files
                .iter()
                .zip(&digests)
                .enumerate()
                .filter(|(index, _)| !self.is_file_cancelled(*index))
                .filter_map(|(_, (file, digest))| {
                    digest.as_ref().map(|md5| InstantCheckEntry {
                        file_name: file.name().to_string(),
                        md5: md5.clone(),
                        file_size: file.size(),
                    })
                })
                .collect();

            let existing = if batch.is_cancelled() {
                None
            } else {
                Some(self.checker.check(task_id, &entries).await)
            };

            // 已取消的文件交给调度器，直接以取消结束，不发起请求
            for (index, (file, digest)) in files.into_iter().zip(digests).enumerate() {
                let hit = match (&existing, &digest) {
                    (Some(result), Some(md5)) => {
                        !self.is_file_cancelled(index) && result.contains(file.name(), md5)
                    }
                    _ => false,
                };

                if hit {
                    outcomes.push(self.complete_instant(index, &file, observer.as_ref()));
                } else {
                    pending.push((index, file));
                }
            }
        } else {
            pending.extend(files.into_iter().enumerate());
        }

        outcomes.extend(
            self.scheduler
                .run_files(task_id, pending, remote_ids, observer.clone(), &batch)
                .await,
        );

        let summary = UploadSummary::from_outcomes(outcomes);
        info!(
            "上传流程结束: 任务={}, 总数={}, 成功={}, 秒传={}, 失败={}",
            task_id, summary.total, summary.completed, summary.instant, summary.failed
        );
        observer.on_all_complete(&summary);
        summary
    }

    fn is_file_cancelled(&self, index: usize) -> bool {
        self.scheduler
            .file_token(index)
            .map_or(false, |token| token.is_cancelled())
    }

    /// 秒传命中：不传输任何数据直接完成
    fn complete_instant(
        &self,
        index: usize,
        file: &UploadableFile,
        observer: &dyn UploadObserver,
    ) -> FileOutcome {
        if let Some(record) = self.scheduler.record_handle(index) {
            record.lock().mark_completed(true);
        }

        let remote = RemoteFileRecord::instant(file.name());
        info!("秒传成功: 文件={}", file.name());
        observer.on_file_start(index, file);
        observer.on_file_progress(index, file, ProgressStage::Upload, 100);
        observer.on_file_complete(index, file, &remote);
        FileOutcome::completed(index, file.name(), remote)
    }
}
