// 待上传文件
//
// 上传过程中文件不可变：名称、大小、类型固定，
// 通过 ByteSource 按任意字节范围读取内容

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 默认 MIME 类型
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 可按字节范围读取的数据源
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// 读取 [start, end) 范围内的字节，必须恰好返回 end - start 个字节
    async fn read_range(&self, range: Range<u64>) -> std::io::Result<Bytes>;
}

/// 本地磁盘文件
///
/// 每次读取都重新打开文件并定位，多个分片/文件之间互不影响
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for LocalFileSource {
    async fn read_range(&self, range: Range<u64>) -> std::io::Result<Bytes> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;

        let len = range.end.saturating_sub(range.start) as usize;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer).await?;

        debug!(
            "读取文件范围: {:?}, bytes={}-{}, 大小={} bytes",
            self.path, range.start, range.end, len
        );

        Ok(Bytes::from(buffer))
    }
}

/// 内存数据源
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_range(&self, range: Range<u64>) -> std::io::Result<Bytes> {
        let len = self.data.len() as u64;
        if range.start > range.end || range.end > len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("读取范围越界: {:?}, 数据长度 {}", range, len),
            ));
        }
        Ok(self.data.slice(range.start as usize..range.end as usize))
    }
}

/// 待上传文件
#[derive(Clone)]
pub struct UploadableFile {
    name: String,
    size: u64,
    content_type: String,
    /// 文件夹上传时相对于根目录的路径
    relative_path: Option<String>,
    source: Arc<dyn ByteSource>,
}

impl UploadableFile {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        content_type: impl Into<String>,
        source: Arc<dyn ByteSource>,
    ) -> Self {
        let content_type = content_type.into();
        Self {
            name: name.into(),
            size,
            content_type: if content_type.is_empty() {
                DEFAULT_CONTENT_TYPE.to_string()
            } else {
                content_type
            },
            relative_path: None,
            source,
        }
    }

    /// 从内存数据创建
    pub fn from_bytes(
        name: impl Into<String>,
        data: impl Into<Bytes>,
        content_type: impl Into<String>,
    ) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::new(name, size, content_type, Arc::new(MemorySource::new(data)))
    }

    /// 从本地文件创建
    ///
    /// 大小取自文件元数据，MIME 类型根据扩展名推断
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("无法获取文件元数据: {:?}", path))?;

        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("无法解析文件名: {:?}", path))?;

        let content_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        Ok(Self::new(
            name,
            metadata.len(),
            content_type,
            Arc::new(LocalFileSource::new(path)),
        ))
    }

    /// 设置文件夹上传的相对路径
    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// 相对路径，没有时退回文件名
    pub fn local_path(&self) -> &str {
        self.relative_path.as_deref().unwrap_or(&self.name)
    }

    /// 读取指定字节范围
    pub async fn read_range(&self, range: Range<u64>) -> std::io::Result<Bytes> {
        let expected = range.end.saturating_sub(range.start);
        let data = self.source.read_range(range).await?;
        if data.len() as u64 != expected {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("期望读取 {} bytes，实际 {} bytes", expected, data.len()),
            ));
        }
        Ok(data)
    }
}

impl fmt::Debug for UploadableFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadableFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .field("relative_path", &self.relative_path)
            .finish()
    }
}
