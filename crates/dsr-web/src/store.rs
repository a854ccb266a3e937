//! 生成报告的临时存储
//!
//! 文件以随机UUID命名写入报告目录，下载时再换回显示名称；超过保留期的文件由
//! 后台任务定期清理。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dsr_core::{DsrError, Result};
use dsr_reports::GeneratedReport;
use regex::Regex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const FILE_ID_PATTERN: &str = r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\.(xlsx|zip)$";

/// 已保存的报告
#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub file_id: String,
    pub file_name: String,
    pub size: usize,
}

impl StoredReport {
    /// 下载地址，显示名称由客户端通过 `name` 参数带回
    pub fn download_path(&self) -> String {
        format!("/api/v1/reports/download/{}", self.file_id)
    }
}

/// 报告文件存储
#[derive(Debug)]
pub struct ReportStore {
    dir: PathBuf,
    retention: Duration,
    file_id: Regex,
}

impl ReportStore {
    /// 打开存储目录，不存在时创建
    pub async fn open(dir: impl Into<PathBuf>, retention: Duration) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let file_id = Regex::new(FILE_ID_PATTERN)
            .map_err(|e| DsrError::Internal(format!("invalid file id pattern: {}", e)))?;
        info!("Report store ready at {}", dir.display());
        Ok(Self { dir, retention, file_id })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_valid_file_id(&self, file_id: &str) -> bool {
        self.file_id.is_match(file_id)
    }

    pub async fn save(&self, report: &GeneratedReport) -> Result<StoredReport> {
        let file_id = format!("{}.{}", Uuid::new_v4(), report.extension());
        tokio::fs::write(self.dir.join(&file_id), &report.bytes).await?;
        debug!("Stored report {} as {}", report.file_name, file_id);

        Ok(StoredReport {
            file_id,
            file_name: report.file_name.clone(),
            size: report.bytes.len(),
        })
    }

    /// 读取报告；名称不合法或文件已清理时返回 NotFound
    pub async fn load(&self, file_id: &str) -> Result<Vec<u8>> {
        let missing = || {
            DsrError::NotFound("file báo cáo hoặc file đã quá hạn. Vui lòng tạo lại.".to_string())
        };
        if !self.is_valid_file_id(file_id) {
            warn!("Rejected report file id: {}", file_id);
            return Err(missing());
        }
        match tokio::fs::read(self.dir.join(file_id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(missing()),
            Err(e) => Err(e.into()),
        }
    }

    /// 删除超过保留期的报告，返回删除数量
    pub async fn purge_expired(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !self.is_valid_file_id(name) {
                continue;
            }
            let age = entry
                .metadata()
                .await?
                .modified()?
                .elapsed()
                .unwrap_or(Duration::ZERO);
            if age < self.retention {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => error!("Failed to remove expired report {}: {}", name, e),
            }
        }
        if removed > 0 {
            info!("Removed {} expired report files", removed);
        }
        Ok(removed)
    }

    /// 启动定期清理任务
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = store.purge_expired().await {
                    error!("Report cleanup failed: {}", e);
                }
            }
        })
    }
}

/// 下载时使用的文件名，去掉路径分隔符与引号
pub fn download_name(requested: Option<&str>, file_id: &str) -> String {
    let cleaned: String = requested
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | '"'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        file_id.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Content-Disposition 头，非ASCII名称按 RFC 5987 编码
pub fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();
    let mut encoded = String::new();
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", ascii, encoded)
}

pub fn content_type(file_name: &str) -> &'static str {
    if file_name.ends_with(".zip") {
        "application/zip"
    } else {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str) -> GeneratedReport {
        GeneratedReport {
            file_name: name.to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::open(dir.path(), Duration::from_secs(3600)).await.unwrap();

        let stored = store.save(&report("BaoCao_SXH_An Giang_2024_Tuan5.xlsx")).await.unwrap();
        assert!(stored.file_id.ends_with(".xlsx"));
        assert!(store.is_valid_file_id(&stored.file_id));
        assert_eq!(stored.size, 3);
        assert_eq!(store.load(&stored.file_id).await.unwrap(), vec![1, 2, 3]);

        let zipped = store.save(&report("TatCaBaoCao_An Giang_2024_Tuan5.zip")).await.unwrap();
        assert!(zipped.file_id.ends_with(".zip"));
    }

    #[tokio::test]
    async fn test_load_rejects_traversal_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::open(dir.path(), Duration::from_secs(3600)).await.unwrap();

        assert!(matches!(store.load("../secret.xlsx").await, Err(DsrError::NotFound(_))));
        let unknown = format!("{}.xlsx", Uuid::new_v4());
        assert!(matches!(store.load(&unknown).await, Err(DsrError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::open(dir.path(), Duration::ZERO).await.unwrap();
        let stored = store.save(&report("a.xlsx")).await.unwrap();
        tokio::fs::write(dir.path().join("keep.txt"), b"x").await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.load(&stored.file_id).await.is_err());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_purge_keeps_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::open(dir.path(), Duration::from_secs(3600)).await.unwrap();
        store.save(&report("a.xlsx")).await.unwrap();
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name(Some("../x/BaoCao.xlsx"), "id.xlsx"), "..xBaoCao.xlsx");
        assert_eq!(download_name(Some("  "), "id.xlsx"), "id.xlsx");
        assert_eq!(download_name(None, "id.zip"), "id.zip");
        assert_eq!(content_type("a.zip"), "application/zip");
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("Báo cáo.xlsx"),
            "attachment; filename=\"B_o c_o.xlsx\"; filename*=UTF-8''B%C3%A1o%20c%C3%A1o.xlsx"
        );
    }
}
