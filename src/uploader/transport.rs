// 单次载荷传输（整个小文件或一个分片）
//
// - 请求体按 64KB 切片流式发送，已写出的字节数通过 watch 通道回报进度
// - 取消令牌与请求并发等待，取消时直接丢弃进行中的请求
// - 不做任何重试，由调用方决定

use crate::api::{TransferPayload, TransferProgress};
use crate::auth::TokenProvider;
use crate::uploader::file::DEFAULT_CONTENT_TYPE;
use crate::uploader::hasher::percent;
use crate::uploader::UploadError;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 请求体切片大小: 64KB
const STREAM_PIECE_SIZE: usize = 64 * 1024;

/// 错误信息最大保留长度
const MAX_ERROR_BODY_LEN: usize = 512;

/// 单次传输
#[derive(Clone)]
pub struct ChunkTransport {
    http: Client,
    token: Arc<dyn TokenProvider>,
}

impl ChunkTransport {
    pub fn new(http: Client, token: Arc<dyn TokenProvider>) -> Self {
        Self { http, token }
    }

    /// 附加认证头（有令牌时）
    pub(crate) fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, UploadError> {
        match self.token.access_token() {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| UploadError::Credential("令牌包含非法字符".to_string()))?;
                Ok(request.header(AUTHORIZATION, value))
            }
            None => Ok(request),
        }
    }

    /// 以 multipart 表单发送一个载荷
    ///
    /// # 参数
    /// * `url` - 目标地址
    /// * `fields` - 附加的文本字段
    /// * `file_field` - 载荷所在的表单字段名
    /// * `payload` - 载荷
    /// * `progress` - 本次载荷的进度回调（单调不减，成功时以 100 结束）
    /// * `cancel` - 取消令牌
    pub async fn send<T>(
        &self,
        url: &str,
        fields: Vec<(&'static str, String)>,
        file_field: &'static str,
        payload: TransferPayload,
        progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<T, UploadError>
    where
        T: DeserializeOwned,
    {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let total = payload.len();
        let (tx, mut rx) = watch::channel(0u64);

        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        form = form.part(file_field, progress_part(payload, tx)?);

        let send = self.authorize(self.http.post(url))?.multipart(form).send();
        tokio::pin!(send);

        let mut last_progress = 0u8;
        let mut streaming = true;

        let response = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("传输已取消: url={}", url);
                    return Err(UploadError::Cancelled);
                }
                result = &mut send => break result?,
                changed = rx.changed(), if streaming => {
                    match changed {
                        Ok(()) => {
                            let sent = *rx.borrow_and_update();
                            // 请求体写完不代表服务器已接收，响应前最多报告 99
                            let value = percent(sent, total).min(99);
                            if value > last_progress {
                                last_progress = value;
                                progress(value);
                            }
                        }
                        Err(_) => streaming = false,
                    }
                }
            }
        };

        let value = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = read_json::<T>(response) => result?,
        };

        if last_progress < 100 {
            progress(100);
        }

        Ok(value)
    }
}

/// 构建带进度上报的文件表单字段
fn progress_part(payload: TransferPayload, tx: watch::Sender<u64>) -> Result<Part, UploadError> {
    let total = payload.len();
    let mime = payload
        .content_type
        .parse::<mime_guess::mime::Mime>()
        .map(|m| m.to_string())
        .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string());

    let pieces: Vec<Bytes> = (0..payload.data.len())
        .step_by(STREAM_PIECE_SIZE)
        .map(|start| {
            let end = (start + STREAM_PIECE_SIZE).min(payload.data.len());
            payload.data.slice(start..end)
        })
        .collect();

    let mut sent = 0u64;
    let stream = futures::stream::iter(pieces).map(move |piece| {
        sent += piece.len() as u64;
        // 接收端已丢弃时忽略
        let _ = tx.send(sent);
        Ok::<Bytes, std::io::Error>(piece)
    });

    let part = Part::stream_with_length(Body::wrap_stream(stream), total)
        .file_name(payload.file_name)
        .mime_str(&mime)?;

    Ok(part)
}

/// 读取响应：非 2xx 转为 Transfer 错误，成功时解析 JSON
///
/// 空响应体按 `{}` 解析
pub(crate) async fn read_json<T>(response: Response) -> Result<T, UploadError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(UploadError::Transfer {
            status: status.as_u16(),
            message: error_message(&text, status.canonical_reason().unwrap_or("")),
        });
    }

    let body = if text.trim().is_empty() { "{}" } else { text.as_str() };
    serde_json::from_str(body)
        .map_err(|e| UploadError::InvalidResponse(format!("{}: {}", e, truncate(&text))))
}

/// 从错误响应体中提取可读信息
fn error_message(body: &str, reason: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message", "error", "msg"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }

    let body = body.trim();
    if body.is_empty() {
        reason.to_string()
    } else {
        truncate(body)
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_ERROR_BODY_LEN {
        return text.to_string();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_json_detail() {
        assert_eq!(error_message(r#"{"detail": "任务不存在"}"#, "Not Found"), "任务不存在");
        assert_eq!(error_message(r#"{"message": "bad"}"#, ""), "bad");
        assert_eq!(error_message("", "Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message("<html>oops</html>", "x"), "<html>oops</html>");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let long = "错".repeat(400);
        let short = truncate(&long);
        assert!(short.ends_with("..."));
        assert!(short.len() <= MAX_ERROR_BODY_LEN + 3);
    }

    #[tokio::test]
    async fn test_progress_part_streams_all_bytes() {
        let (tx, rx) = watch::channel(0u64);
        let payload = TransferPayload {
            file_name: "a.bin".to_string(),
            content_type: "not a mime".to_string(),
            data: Bytes::from(vec![1u8; STREAM_PIECE_SIZE * 2 + 10]),
        };
        // 非法 MIME 回退为默认类型，不报错
        let part = progress_part(payload, tx);
        assert!(part.is_ok());
        assert_eq!(*rx.borrow(), 0);
    }
}
