// 上传接口请求/响应类型

use crate::uploader::ContentDigest;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 秒传检测的单个文件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstantCheckEntry {
    pub file_name: String,
    pub md5: ContentDigest,
    pub file_size: u64,
}

/// 秒传检测请求体
#[derive(Debug, Serialize)]
pub(crate) struct InstantCheckRequest<'a> {
    pub files: &'a [InstantCheckEntry],
}

/// 服务器已存在的文件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExistingFile {
    pub file_name: String,
    #[serde(default)]
    pub md5: Option<ContentDigest>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// 秒传检测结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstantCheckResult {
    /// 服务器已存在的文件
    #[serde(default)]
    pub existing_files: Vec<ExistingFile>,
    /// 需要完整上传的文件数
    #[serde(default)]
    pub new_files_count: usize,
    /// 节省的存储/传输字节数
    #[serde(default)]
    pub storage_saved: u64,
}

impl InstantCheckResult {
    /// 检测失败时的降级结果：全部视为新文件
    pub fn all_new(file_count: usize) -> Self {
        Self {
            existing_files: Vec::new(),
            new_files_count: file_count,
            storage_saved: 0,
        }
    }

    /// 文件是否已存在于服务器
    ///
    /// 服务器返回了 md5 时同时比对 md5，否则只比对文件名
    pub fn contains(&self, file_name: &str, md5: &ContentDigest) -> bool {
        self.existing_files.iter().any(|f| {
            f.file_name == file_name && f.md5.as_ref().map_or(true, |m| m == md5)
        })
    }
}

/// 初始化分片上传请求体
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InitMultipartRequest {
    pub task_file_id: String,
    pub file_size: u64,
    pub file_name: String,
    pub mime_type: String,
}

/// 初始化分片上传响应
#[derive(Debug, Clone, Deserialize)]
pub struct InitMultipartResponse {
    pub upload_id: String,
}

/// 分片上传响应（分片完成凭证）
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkReceipt {
    pub etag: String,
}

/// 已被服务器接收的分片
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// 合并分片请求体
#[derive(Debug, Serialize)]
pub(crate) struct CompleteMultipartRequest<'a> {
    pub upload_id: &'a str,
    pub chunk_etags: &'a [CompletedPart],
}

/// 服务器文件记录（直接上传或合并分片后返回）
///
/// 只解析上传核心关心的字段，其余字段原样保留
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteFileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// 是否为秒传
    #[serde(default)]
    pub instant_upload: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl RemoteFileRecord {
    /// 秒传命中时的本地记录（没有发生任何传输）
    pub fn instant(file_name: &str) -> Self {
        Self {
            id: None,
            file_name: Some(file_name.to_string()),
            instant_upload: true,
            extra: HashMap::new(),
        }
    }
}

/// 任务文件（获取 fileId 映射用）
#[derive(Debug, Clone, Deserialize)]
pub struct TaskFileEntry {
    pub id: Value,
    pub file_name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl TaskFileEntry {
    /// 文件 ID 的字符串形式（服务器可能返回数字或字符串）
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 任务文件列表响应
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskFilesResponse {
    #[serde(default)]
    pub files: Vec<TaskFileEntry>,
}

/// 一次传输的载荷（整个小文件或一个分片）
#[derive(Debug, Clone)]
pub struct TransferPayload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl TransferPayload {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
