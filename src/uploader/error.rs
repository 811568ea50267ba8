// 上传错误分类
//
// 单个文件的错误在文件上传边界被捕获，通过 on_file_error 回调上报，
// 不会中断同批次的其他文件

use thiserror::Error;

/// 上传核心错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 本地文件读取失败（哈希或读取分片时）
    #[error("文件读取失败: {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// 请求未能到达服务器（连接失败、超时等）
    #[error("网络错误: {0}")]
    Network(String),

    /// 服务器返回非 2xx 状态码
    #[error("传输失败: HTTP {status}: {message}")]
    Transfer { status: u16, message: String },

    /// 服务器响应无法解析
    #[error("响应解析失败: {0}")]
    InvalidResponse(String),

    /// 协作式取消
    #[error("上传已取消")]
    Cancelled,

    /// 分片重试次数耗尽
    #[error("分片 {part_number} 上传失败，已达到最大重试次数 ({attempts}): {source}")]
    ChunkUploadFailed {
        part_number: u32,
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },

    /// 分片上传初始化失败
    #[error("初始化分片上传失败: {0}")]
    SessionInit(#[source] Box<UploadError>),

    /// 合并分片失败
    #[error("完成分片上传失败: {0}")]
    SessionComplete(#[source] Box<UploadError>),

    /// 找不到文件对应的远程文件 ID（不发起任何网络请求）
    #[error("找不到文件 {0} 对应的 fileId")]
    MissingRemoteId(String),

    /// 认证凭据不可用
    #[error("认证凭据不可用: {0}")]
    Credential(String),
}

impl UploadError {
    /// 是否为取消（终态，但不算应用错误）
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// 是否值得在分片重试循环中再次尝试
    ///
    /// 取消、本地读取错误和配置错误重试也不会有不同结果
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UploadError::Network(_)
                | UploadError::Transfer { .. }
                | UploadError::InvalidResponse(_)
        )
    }

    /// HTTP 状态码（仅 Transfer 错误有）
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Transfer { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn read(name: &str, source: std::io::Error) -> Self {
        UploadError::Read {
            name: name.to_string(),
            source,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return UploadError::Transfer {
                status: status.as_u16(),
                message: e.to_string(),
            };
        }
        if e.is_decode() {
            return UploadError::InvalidResponse(e.to_string());
        }
        if e.is_timeout() {
            return UploadError::Network(format!("请求超时: {}", e));
        }
        UploadError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(UploadError::Network("connection reset".into()).is_retriable());
        assert!(UploadError::Transfer {
            status: 502,
            message: "bad gateway".into()
        }
        .is_retriable());
        assert!(UploadError::InvalidResponse("eof".into()).is_retriable());

        assert!(!UploadError::Cancelled.is_retriable());
        assert!(!UploadError::MissingRemoteId("a.txt".into()).is_retriable());
        assert!(!UploadError::read(
            "a.txt",
            std::io::Error::new(std::io::ErrorKind::Other, "disk")
        )
        .is_retriable());
    }

    #[test]
    fn test_chunk_failure_message_carries_part_number() {
        let err = UploadError::ChunkUploadFailed {
            part_number: 7,
            attempts: 3,
            source: Box::new(UploadError::Network("timeout".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("分片 7"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_status_only_for_transfer() {
        let err = UploadError::Transfer {
            status: 413,
            message: "too large".into(),
        };
        assert_eq!(err.status(), Some(413));
        assert_eq!(UploadError::Cancelled.status(), None);
        assert!(UploadError::Cancelled.is_cancelled());
    }
}
