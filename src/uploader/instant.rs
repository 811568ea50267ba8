// 秒传检测
//
// 把一批文件的 MD5 提交给服务器，找出已存在的文件。
// 检测失败不影响上传：任何错误都降级为“全部是新文件”

use crate::api::{InstantCheckEntry, InstantCheckResult, UploadApi};
use std::sync::Arc;
use tracing::{info, warn};

/// 秒传检测器
#[derive(Clone)]
pub struct InstantUploadChecker {
    api: Arc<dyn UploadApi>,
}

impl InstantUploadChecker {
    pub fn new(api: Arc<dyn UploadApi>) -> Self {
        Self { api }
    }

    /// 批量检测
    ///
    /// 不返回错误：网络或服务器失败时返回空的已存在列表，
    /// new_files_count 等于输入数量
    pub async fn check(&self, task_id: &str, files: &[InstantCheckEntry]) -> InstantCheckResult {
        if files.is_empty() {
            return InstantCheckResult::all_new(0);
        }

        match self.api.check_instant(task_id, files).await {
            Ok(result) => {
                info!(
                    "秒传检测完成: 任务={}, 文件数={}, 已存在={}, 需上传={}, 节省={} bytes",
                    task_id,
                    files.len(),
                    result.existing_files.len(),
                    result.new_files_count,
                    result.storage_saved
                );
                result
            }
            Err(e) => {
                warn!("秒传检测失败，全部按新文件上传: 任务={}, 错误={}", task_id, e);
                InstantCheckResult::all_new(files.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ExistingFile;
    use crate::uploader::test_support::{ApiCall, FakeApi};
    use crate::uploader::ContentDigest;

    fn entry(name: &str, md5: &str) -> InstantCheckEntry {
        InstantCheckEntry {
            file_name: name.to_string(),
            md5: ContentDigest::from_hex(md5),
            file_size: 1024,
        }
    }

    #[tokio::test]
    async fn test_one_of_two_files_exists() {
        let api = Arc::new(FakeApi::new());
        api.set_existing(vec![ExistingFile {
            file_name: "a.jpg".to_string(),
            md5: Some(ContentDigest::from_hex("aaaa")),
            file_size: Some(1024),
        }]);

        let checker = InstantUploadChecker::new(api.clone());
        let result = checker
            .check("t1", &[entry("a.jpg", "aaaa"), entry("b.jpg", "bbbb")])
            .await;

        assert_eq!(result.existing_files.len(), 1);
        assert_eq!(result.existing_files[0].file_name, "a.jpg");
        assert_eq!(result.new_files_count, 1);
        assert_eq!(result.storage_saved, 1024);
        assert_eq!(api.calls(), vec![ApiCall::CheckInstant { files: 2 }]);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_all_new() {
        let api = Arc::new(FakeApi::new());
        api.fail_instant_check();

        let checker = InstantUploadChecker::new(api);
        let result = checker
            .check("t1", &[entry("a.jpg", "aaaa"), entry("b.jpg", "bbbb")])
            .await;

        assert!(result.existing_files.is_empty());
        assert_eq!(result.new_files_count, 2);
        assert_eq!(result.storage_saved, 0);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let api = Arc::new(FakeApi::new());
        let checker = InstantUploadChecker::new(api.clone());
        let result = checker.check("t1", &[]).await;
        assert_eq!(result.new_files_count, 0);
        assert!(api.calls().is_empty());
    }
}
