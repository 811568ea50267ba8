// 文件内容哈希
//
// 按固定窗口（默认 2MB）顺序读取文件，增量计算完整文件 MD5，
// 用于秒传检测。任一窗口读取失败都会中止整个计算，不返回部分结果

use crate::uploader::{UploadError, UploadableFile};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 默认读取窗口大小: 2MB
pub const DEFAULT_HASH_WINDOW_SIZE: u64 = 2 * 1024 * 1024;

/// 文件内容摘要（128 位 MD5，小写十六进制）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct ContentDigest(String);

impl From<String> for ContentDigest {
    fn from(hex: String) -> Self {
        Self(hex.to_ascii_lowercase())
    }
}

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 从十六进制字符串构造（服务器返回值或测试数据）
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self::from(hex.into())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 内容哈希计算器
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    window_size: u64,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_WINDOW_SIZE)
    }
}

impl ContentHasher {
    pub fn new(window_size: u64) -> Self {
        Self {
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// 计算文件 MD5
    ///
    /// # 参数
    /// * `file` - 待计算文件
    /// * `cancel` - 取消令牌，在窗口之间检查
    /// * `on_progress` - 进度回调（0-100，按已处理字节线性、单调不减，成功时以 100 结束）
    pub async fn digest<F>(
        &self,
        file: &UploadableFile,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<ContentDigest, UploadError>
    where
        F: FnMut(u8),
    {
        let total = file.size();
        let mut context = md5::Context::new();
        let mut offset = 0u64;
        let mut last_progress = 0u8;

        while offset < total {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let end = (offset + self.window_size).min(total);
            let window = file
                .read_range(offset..end)
                .await
                .map_err(|e| UploadError::read(file.name(), e))?;
            context.consume(&window);
            offset = end;

            let progress = percent(offset, total);
            if progress > last_progress {
                last_progress = progress;
                on_progress(progress);
            }
        }

        // 空文件没有任何窗口，仍需报告完成
        if last_progress < 100 {
            on_progress(100);
        }

        let digest = ContentDigest(format!("{:x}", context.compute()));

        debug!(
            "文件哈希计算完成: name={}, size={}, md5={}",
            file.name(),
            total,
            digest
        );

        Ok(digest)
    }
}

/// 按字节计算百分比（四舍五入，上限 100）
pub(crate) fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total) as u128;
    ((done * 100 + total as u128 / 2) / total as u128) as u8
}
