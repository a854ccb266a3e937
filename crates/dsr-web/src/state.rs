//! 共享应用状态

use std::sync::Arc;
use std::time::Duration;

use dsr_database::DatabasePool;
use dsr_reports::ReportGenerator;

use crate::auth::AuthService;
use crate::store::ReportStore;

/// Web层设置
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            cors_allowed_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(120),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// 各处理器共享的状态
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub auth: Arc<AuthService>,
    pub generator: Arc<ReportGenerator>,
    pub reports: Arc<ReportStore>,
    pub settings: Arc<WebSettings>,
}

impl AppState {
    pub fn new(
        pool: DatabasePool,
        auth: AuthService,
        generator: ReportGenerator,
        reports: ReportStore,
        settings: WebSettings,
    ) -> Self {
        Self {
            pool,
            auth: Arc::new(auth),
            generator: Arc::new(generator),
            reports: Arc::new(reports),
            settings: Arc::new(settings),
        }
    }
}
