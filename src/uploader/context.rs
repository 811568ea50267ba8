// 单个文件的上传上下文
//
// 每个文件一份，携带自己的取消令牌和进度出口，沿调用链按引用传递

use crate::uploader::{
    FileTransferRecord, ProgressStage, UploadObserver, UploadableFile,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct FileUploadContext {
    index: usize,
    file: UploadableFile,
    remote_file_id: String,
    cancel: CancellationToken,
    observer: Arc<dyn UploadObserver>,
    record: Arc<Mutex<FileTransferRecord>>,
    md5_progress: AtomicU8,
    upload_progress: AtomicU8,
}

impl FileUploadContext {
    pub fn new(
        index: usize,
        file: UploadableFile,
        remote_file_id: impl Into<String>,
        cancel: CancellationToken,
        observer: Arc<dyn UploadObserver>,
        record: Arc<Mutex<FileTransferRecord>>,
    ) -> Self {
        Self {
            index,
            file,
            remote_file_id: remote_file_id.into(),
            cancel,
            observer,
            record,
            md5_progress: AtomicU8::new(0),
            upload_progress: AtomicU8::new(0),
        }
    }

    /// 独立使用（不经过调度器）时的上下文
    pub fn standalone(
        file: UploadableFile,
        remote_file_id: impl Into<String>,
        cancel: CancellationToken,
        observer: Arc<dyn UploadObserver>,
    ) -> Self {
        let remote_file_id = remote_file_id.into();
        let record = FileTransferRecord::new(0, &file, Some(remote_file_id.clone()));
        Self::new(
            0,
            file,
            remote_file_id,
            cancel,
            observer,
            Arc::new(Mutex::new(record)),
        )
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn file(&self) -> &UploadableFile {
        &self.file
    }

    pub fn remote_file_id(&self) -> &str {
        &self.remote_file_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn record(&self) -> &Arc<Mutex<FileTransferRecord>> {
        &self.record
    }

    /// 上报进度
    ///
    /// 每个阶段单调不减，低于已上报值的进度直接丢弃
    pub fn report_progress(&self, stage: ProgressStage, percent: u8) {
        let percent = percent.min(100);
        let slot = match stage {
            ProgressStage::Md5 => &self.md5_progress,
            ProgressStage::Upload => &self.upload_progress,
        };
        let previous = slot.fetch_max(percent, Ordering::AcqRel);
        if percent > previous {
            self.observer
                .on_file_progress(self.index, &self.file, stage, percent);
        }
    }

    /// 当前进度
    pub fn progress(&self, stage: ProgressStage) -> u8 {
        match stage {
            ProgressStage::Md5 => self.md5_progress.load(Ordering::Acquire),
            ProgressStage::Upload => self.upload_progress.load(Ordering::Acquire),
        }
    }

    /// 更新累计已发送字节数（不超过文件大小）
    pub fn set_bytes_sent(&self, bytes: u64) {
        self.record.lock().set_bytes_sent(bytes);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.record.lock().bytes_sent
    }

    pub(crate) fn observer(&self) -> &Arc<dyn UploadObserver> {
        &self.observer
    }
}
