// 上传事件与回调
//
// 回调总是带上文件序号，并发上传时各文件的进度不会混淆

use crate::api::RemoteFileRecord;
use crate::uploader::{FileStage, UploadError, UploadableFile};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// 进度阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    /// 计算 MD5
    Md5,
    /// 传输
    Upload,
}

/// 上传过程回调
///
/// 所有方法都有空实现，按需覆盖
#[allow(unused_variables)]
pub trait UploadObserver: Send + Sync {
    /// 文件开始上传
    fn on_file_start(&self, index: usize, file: &UploadableFile) {}

    /// 文件进度（同一文件同一阶段内单调不减）
    fn on_file_progress(
        &self,
        index: usize,
        file: &UploadableFile,
        stage: ProgressStage,
        percent: u8,
    ) {
    }

    /// 批量计算 MD5 的整体进度
    fn on_hash_batch_progress(&self, percent: u8) {}

    /// 文件上传成功（包括秒传）
    fn on_file_complete(&self, index: usize, file: &UploadableFile, record: &RemoteFileRecord) {}

    /// 文件上传失败或取消
    fn on_file_error(&self, index: usize, file: &UploadableFile, error: &UploadError) {}

    /// 批次结束，每次运行只触发一次
    fn on_all_complete(&self, summary: &UploadSummary) {}
}

/// 不做任何处理的回调
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

/// 单个文件的最终结果
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub index: usize,
    pub file_name: String,
    /// 终态
    pub stage: FileStage,
    /// 是否秒传
    pub instant_upload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<RemoteFileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn completed(index: usize, file_name: &str, record: RemoteFileRecord) -> Self {
        Self {
            index,
            file_name: file_name.to_string(),
            stage: FileStage::Completed,
            instant_upload: record.instant_upload,
            record: Some(record),
            error: None,
        }
    }

    pub fn errored(index: usize, file_name: &str, error: &UploadError) -> Self {
        Self {
            index,
            file_name: file_name.to_string(),
            stage: if error.is_cancelled() {
                FileStage::Cancelled
            } else {
                FileStage::Failed
            },
            instant_upload: false,
            record: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.stage == FileStage::Completed
    }
}

/// 批次汇总
///
/// `failed` 包含被取消的文件，始终满足 completed + failed == total
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// 其中被取消的文件数
    pub cancelled: usize,
    /// 其中秒传的文件数
    pub instant: usize,
    /// 按文件序号排列的结果
    pub results: Vec<FileOutcome>,
}

impl UploadSummary {
    pub fn from_outcomes(mut results: Vec<FileOutcome>) -> Self {
        results.sort_by_key(|r| r.index);

        let completed = results.iter().filter(|r| r.is_completed()).count();
        let cancelled = results
            .iter()
            .filter(|r| r.stage == FileStage::Cancelled)
            .count();
        let instant = results
            .iter()
            .filter(|r| r.is_completed() && r.instant_upload)
            .count();

        Self {
            total: results.len(),
            completed,
            failed: results.len() - completed,
            cancelled,
            instant,
            results,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// 可序列化的上传事件（推送给界面层）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    FileStart {
        index: usize,
        file_name: String,
        file_size: u64,
    },
    FileProgress {
        index: usize,
        file_name: String,
        stage: ProgressStage,
        percent: u8,
    },
    HashBatchProgress {
        percent: u8,
    },
    FileComplete {
        index: usize,
        file_name: String,
        instant_upload: bool,
    },
    FileError {
        index: usize,
        file_name: String,
        message: String,
        cancelled: bool,
    },
    AllComplete {
        total: usize,
        completed: usize,
        failed: usize,
    },
}

/// 将回调转为事件发送到通道
#[derive(Debug, Clone)]
pub struct EventForwarder {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl EventForwarder {
    pub fn new(tx: mpsc::UnboundedSender<UploadEvent>) -> Self {
        Self { tx }
    }

    /// 创建转发器及对应的接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn emit(&self, event: UploadEvent) {
        if self.tx.send(event).is_err() {
            debug!("事件接收端已关闭，丢弃上传事件");
        }
    }
}

impl UploadObserver for EventForwarder {
    fn on_file_start(&self, index: usize, file: &UploadableFile) {
        self.emit(UploadEvent::FileStart {
            index,
            file_name: file.name().to_string(),
            file_size: file.size(),
        });
    }

    fn on_file_progress(
        &self,
        index: usize,
        file: &UploadableFile,
        stage: ProgressStage,
        percent: u8,
    ) {
        self.emit(UploadEvent::FileProgress {
            index,
            file_name: file.name().to_string(),
            stage,
            percent,
        });
    }

    fn on_hash_batch_progress(&self, percent: u8) {
        self.emit(UploadEvent::HashBatchProgress { percent });
    }

    fn on_file_complete(&self, index: usize, file: &UploadableFile, record: &RemoteFileRecord) {
        self.emit(UploadEvent::FileComplete {
            index,
            file_name: file.name().to_string(),
            instant_upload: record.instant_upload,
        });
    }

    fn on_file_error(&self, index: usize, file: &UploadableFile, error: &UploadError) {
        self.emit(UploadEvent::FileError {
            index,
            file_name: file.name().to_string(),
            message: error.to_string(),
            cancelled: error.is_cancelled(),
        });
    }

    fn on_all_complete(&self, summary: &UploadSummary) {
        self.emit(UploadEvent::AllComplete {
            total: summary.total,
            completed: summary.completed,
            failed: summary.failed,
        });
    }
}
