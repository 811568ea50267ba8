// 上传接口客户端

use crate::api::types::{
    CompleteMultipartRequest, InstantCheckRequest, TaskFilesResponse,
};
use crate::api::{
    ApiEndpoints, ChunkReceipt, CompletedPart, InitMultipartRequest, InitMultipartResponse,
    InstantCheckEntry, InstantCheckResult, RemoteFileRecord, TaskFileEntry, TransferPayload,
    TransferProgress, UploadApi,
};
use crate::auth::TokenProvider;
use crate::config::ApiConfig;
use crate::uploader::transport::{read_json, ChunkTransport};
use crate::uploader::UploadError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 基于 reqwest 的上传接口客户端
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    endpoints: ApiEndpoints,
    transport: ChunkTransport,
}

impl ApiClient {
    /// 创建客户端
    ///
    /// 请求超时来自配置，超时按传输失败处理
    pub fn new(config: &ApiConfig, token: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        let endpoints = ApiEndpoints::from_config(config);

        info!(
            "初始化上传接口客户端: 环境={}, 地址={}",
            config.environment.display_name(),
            endpoints.base()
        );

        Ok(Self {
            transport: ChunkTransport::new(http.clone(), token),
            http,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, UploadError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!("POST {}", url);
        let response = self
            .transport
            .authorize(self.http.post(url))?
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, UploadError>
    where
        T: DeserializeOwned,
    {
        debug!("GET {}", url);
        let response = self.transport.authorize(self.http.get(url))?.send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl UploadApi for ApiClient {
    async fn check_instant(
        &self,
        task_id: &str,
        files: &[InstantCheckEntry],
    ) -> Result<InstantCheckResult, UploadError> {
        let url = self.endpoints.check_instant(task_id);
        self.post_json(&url, &InstantCheckRequest { files }).await
    }

    async fn upload_direct(
        &self,
        task_id: &str,
        remote_file_id: &str,
        payload: TransferPayload,
        progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<RemoteFileRecord, UploadError> {
        let url = self.endpoints.upload_direct(task_id, remote_file_id);
        self.transport
            .send(&url, Vec::new(), "file", payload, progress, cancel)
            .await
    }

    async fn init_multipart(
        &self,
        task_id: &str,
        remote_file_id: &str,
        request: &InitMultipartRequest,
    ) -> Result<InitMultipartResponse, UploadError> {
        let url = self.endpoints.multipart_init(task_id, remote_file_id);
        self.post_json(&url, request).await
    }

    async fn upload_chunk(
        &self,
        task_id: &str,
        remote_file_id: &str,
        upload_id: &str,
        part_number: u32,
        payload: TransferPayload,
        progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<ChunkReceipt, UploadError> {
        let url = self.endpoints.multipart_upload(task_id, remote_file_id);
        let fields = vec![
            ("chunk_index", part_number.to_string()),
            ("upload_id", upload_id.to_string()),
        ];
        self.transport
            .send(&url, fields, "chunk", payload, progress, cancel)
            .await
    }

    async fn complete_multipart(
        &self,
        task_id: &str,
        remote_file_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<RemoteFileRecord, UploadError> {
        let url = self.endpoints.multipart_complete(task_id, remote_file_id);
        self.post_json(
            &url,
            &CompleteMultipartRequest {
                upload_id,
                chunk_etags: parts,
            },
        )
        .await
    }

    async fn list_task_files(&self, task_id: &str) -> Result<Vec<TaskFileEntry>, UploadError> {
        let url = self.endpoints.task_files(task_id);
        let response: TaskFilesResponse = self.get_json(&url).await?;
        Ok(response.files)
    }
}
