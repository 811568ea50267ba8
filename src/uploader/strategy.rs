// 上传策略选择
//
// 纯函数：小于阈值直接上传，大于等于阈值分片上传。
// 空文件没有分片可传，始终直接上传

use serde::{Deserialize, Serialize};

/// 默认大文件阈值: 5MB
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 5 * 1024 * 1024;

/// 上传方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStrategy {
    /// 整个文件一次请求上传
    Direct,
    /// 初始化 → 逐个分片 → 合并
    Chunked,
}

impl UploadStrategy {
    /// 根据文件大小选择上传方式
    pub fn select(file_size: u64, threshold: u64) -> Self {
        if file_size == 0 || file_size < threshold {
            UploadStrategy::Direct
        } else {
            UploadStrategy::Chunked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        let t = DEFAULT_LARGE_FILE_THRESHOLD;
        assert_eq!(UploadStrategy::select(t - 1, t), UploadStrategy::Direct);
        assert_eq!(UploadStrategy::select(t, t), UploadStrategy::Chunked);
        assert_eq!(UploadStrategy::select(t + 1, t), UploadStrategy::Chunked);
        assert_eq!(UploadStrategy::select(0, t), UploadStrategy::Direct);
    }

    #[test]
    fn test_empty_file_is_direct_even_with_zero_threshold() {
        assert_eq!(UploadStrategy::select(0, 0), UploadStrategy::Direct);
        assert_eq!(UploadStrategy::select(1, 0), UploadStrategy::Chunked);
    }
}
