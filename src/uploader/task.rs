// 单个文件的上传记录
//
// 由调度器持有，状态流转：
// queued → hashing → uploading → completed | failed | cancelled
// 进入终态后不再变化

use crate::uploader::{UploadStrategy, UploadableFile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 文件上传阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStage {
    /// 排队中
    Queued,
    /// 计算 MD5
    Hashing,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已取消
    Cancelled,
}

impl FileStage {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStage::Completed | FileStage::Failed | FileStage::Cancelled
        )
    }
}

/// 单个文件的上传记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransferRecord {
    /// 记录ID
    pub id: String,
    /// 文件在本批次中的序号
    pub index: usize,
    /// 文件名
    pub file_name: String,
    /// 文件大小
    pub total_size: u64,
    /// 远程文件ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_file_id: Option<String>,
    /// 上传方式
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<UploadStrategy>,
    /// 当前阶段
    pub stage: FileStage,
    /// 已发送字节数（不超过文件大小）
    pub bytes_sent: u64,
    /// 是否秒传
    #[serde(default)]
    pub instant_upload: bool,
    /// 文件 MD5（上传前计算时才有）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
    /// 最近一次错误
    pub error: Option<String>,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 结束时间 (Unix timestamp)
    pub finished_at: Option<i64>,
}

impl FileTransferRecord {
    /// 文件出队时创建
    pub fn new(index: usize, file: &UploadableFile, remote_file_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            index,
            file_name: file.name().to_string(),
            total_size: file.size(),
            remote_file_id,
            strategy: None,
            stage: FileStage::Queued,
            bytes_sent: 0,
            instant_upload: false,
            content_md5: None,
            error: None,
            created_at: chrono::Utc::now().timestamp(),
            finished_at: None,
        }
    }

    /// 计算进度百分比
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return if self.stage == FileStage::Completed {
                100.0
            } else {
                0.0
            };
        }
        (self.bytes_sent as f64 / self.total_size as f64) * 100.0
    }

    /// 进入哈希阶段
    pub fn mark_hashing(&mut self) -> bool {
        self.transition(FileStage::Hashing)
    }

    /// 进入上传阶段
    pub fn mark_uploading(&mut self, strategy: UploadStrategy) -> bool {
        if self.transition(FileStage::Uploading) {
            self.strategy = Some(strategy);
            true
        } else {
            false
        }
    }

    /// 更新已发送字节数（单调不减，不超过文件大小）
    pub fn set_bytes_sent(&mut self, bytes: u64) {
        if self.stage.is_terminal() {
            return;
        }
        self.bytes_sent = self.bytes_sent.max(bytes.min(self.total_size));
    }

    /// 标记完成
    pub fn mark_completed(&mut self, instant_upload: bool) -> bool {
        if !self.transition(FileStage::Completed) {
            return false;
        }
        self.bytes_sent = self.total_size;
        self.instant_upload = instant_upload;
        self.finished_at = Some(chrono::Utc::now().timestamp());
        true
    }

    /// 标记失败
    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        let error = error.into();
        if !self.transition(FileStage::Failed) {
            return false;
        }
        self.error = Some(error);
        self.finished_at = Some(chrono::Utc::now().timestamp());
        true
    }

    /// 标记取消
    pub fn mark_cancelled(&mut self) -> bool {
        if !self.transition(FileStage::Cancelled) {
            return false;
        }
        self.error = Some("上传已取消".to_string());
        self.finished_at = Some(chrono::Utc::now().timestamp());
        true
    }

    fn transition(&mut self, next: FileStage) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.stage = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(size: usize) -> FileTransferRecord {
        let file = UploadableFile::from_bytes("a.bin", vec![0u8; size], "");
        FileTransferRecord::new(0, &file, Some("f1".to_string()))
    }

    #[test]
    fn test_lifecycle() {
        let mut r = record(100);
        assert_eq!(r.stage, FileStage::Queued);
        assert!(r.mark_hashing());
        assert!(r.mark_uploading(UploadStrategy::Direct));
        r.set_bytes_sent(40);
        assert_eq!(r.progress(), 40.0);
        assert!(r.mark_completed(false));
        assert_eq!(r.bytes_sent, 100);
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn test_single_terminal_state() {
        let mut r = record(10);
        assert!(r.mark_cancelled());
        assert!(!r.mark_completed(false));
        assert!(!r.mark_failed("late error"));
        assert_eq!(r.stage, FileStage::Cancelled);
        assert_eq!(r.error.as_deref(), Some("上传已取消"));
    }

    #[test]
    fn test_bytes_sent_capped_and_monotonic() {
        let mut r = record(10);
        r.set_bytes_sent(8);
        r.set_bytes_sent(3);
        assert_eq!(r.bytes_sent, 8);
        r.set_bytes_sent(1000);
        assert_eq!(r.bytes_sent, 10);
    }

    #[test]
    fn test_empty_file_progress() {
        let mut r = record(0);
        assert_eq!(r.progress(), 0.0);
        r.mark_completed(true);
        assert_eq!(r.progress(), 100.0);
        assert!(r.instant_upload);
    }
}
