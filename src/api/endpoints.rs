// 上传接口地址

use crate::config::ApiConfig;

/// 上传相关接口地址
///
/// 所有 ID 都经过百分号编码后拼入路径
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    base: String,
}

impl ApiEndpoints {
    /// `base` 为 API 基础路径，如 http://api.yuntucv.com/api/v1
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(config.api_base())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn task(&self, task_id: &str) -> String {
        format!(
            "{}/upload-tasks/{}",
            self.base,
            urlencoding::encode(task_id)
        )
    }

    fn task_file(&self, task_id: &str, file_id: &str) -> String {
        format!("{}/files/{}", self.task(task_id), urlencoding::encode(file_id))
    }

    /// 任务文件列表 GET
    pub fn task_files(&self, task_id: &str) -> String {
        format!("{}/files", self.task(task_id))
    }

    /// 秒传检测 POST
    pub fn check_instant(&self, task_id: &str) -> String {
        format!("{}/files/check", self.task(task_id))
    }

    /// 小文件直接上传 POST
    pub fn upload_direct(&self, task_id: &str, file_id: &str) -> String {
        format!("{}/upload", self.task_file(task_id, file_id))
    }

    /// 初始化分片上传 POST
    pub fn multipart_init(&self, task_id: &str, file_id: &str) -> String {
        format!("{}/multipart/init", self.task_file(task_id, file_id))
    }

    /// 上传分片 POST
    pub fn multipart_upload(&self, task_id: &str, file_id: &str) -> String {
        format!("{}/multipart/upload", self.task_file(task_id, file_id))
    }

    /// 合并分片 POST
    pub fn multipart_complete(&self, task_id: &str, file_id: &str) -> String {
        format!("{}/multipart/complete", self.task_file(task_id, file_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        let endpoints = ApiEndpoints::new("http://localhost:8000/api/v1/");
        assert_eq!(
            endpoints.check_instant("t1"),
            "http://localhost:8000/api/v1/upload-tasks/t1/files/check"
        );
        assert_eq!(
            endpoints.upload_direct("t1", "f1"),
            "http://localhost:8000/api/v1/upload-tasks/t1/files/f1/upload"
        );
        assert_eq!(
            endpoints.multipart_complete("t1", "f1"),
            "http://localhost:8000/api/v1/upload-tasks/t1/files/f1/multipart/complete"
        );
        assert_eq!(
            endpoints.task_files("t1"),
            "http://localhost:8000/api/v1/upload-tasks/t1/files"
        );
    }

    #[test]
    fn test_ids_are_percent_encoded() {
        let endpoints = ApiEndpoints::new("http://h/api/v1");
        assert_eq!(
            endpoints.multipart_init("a/b", "c d"),
            "http://h/api/v1/upload-tasks/a%2Fb/files/c%20d/multipart/init"
        );
    }

    #[test]
    fn test_from_config() {
        let endpoints = ApiEndpoints::from_config(&ApiConfig::with_base_url("http://x:1"));
        assert_eq!(endpoints.base(), "http://x:1/api/v1");
    }
}
