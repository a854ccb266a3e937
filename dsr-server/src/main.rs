//! 传染病监测报告系统服务器主程序

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dsr_admin::{init_logging, ConfigManager, DsrConfig};
use dsr_core::{UnitTree, UserRole};
use dsr_database::{DatabasePool, DatabaseQueries, NewUser};
use dsr_import::Importer;
use dsr_reports::{ReportGenerator, ReportSettings};
use dsr_web::{hash_password, AppState, AuthService, ReportStore, WebServer, WebSettings};
use tracing::{error, info, warn};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "dsr-server")]
#[command(about = "Hệ thống báo cáo giám sát bệnh truyền nhiễm")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动Web服务（默认）
    Serve,
    /// 创建数据库表
    InitDb,
    /// 创建用户
    CreateUser {
        username: String,
        password: String,
        #[arg(long)]
        email: Option<String>,
        /// 创建管理员账户
        #[arg(long, conflicts_with = "unit")]
        admin: bool,
        /// 所属单位的ID或名称
        #[arg(long, required_unless_present = "admin")]
        unit: Option<String>,
    },
    /// 从Excel导入行政区划树
    ImportUnits {
        file: PathBuf,
        /// 先清空现有单位
        #[arg(long)]
        replace: bool,
    },
    /// 从Excel导入病例（不限制乡）
    ImportCases { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::new(args.config.as_deref())?;
    let config = manager.get_config().await;
    init_logging(&config.logging, args.log_level.as_deref())?;

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::InitDb => init_db(&config).await,
        Command::CreateUser { username, password, email, admin, unit } => {
            create_user(&config, &username, &password, email, admin, unit.as_deref()).await
        }
        Command::ImportUnits { file, replace } => import_units(&config, &file, replace).await,
        Command::ImportCases { file } => import_cases(&config, &file).await,
    };

    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
    }
    result
}

async fn connect(config: &DsrConfig) -> Result<DatabasePool> {
    let pool = DatabasePool::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout(),
    )
    .await
    .context("Failed to connect to database")?;
    Ok(pool)
}

async fn serve(config: DsrConfig) -> Result<()> {
    info!("Starting disease surveillance reporting server...");
    let pool = connect(&config).await?;
    DatabaseQueries::new(&pool)
        .create_tables()
        .await
        .context("Failed to create database schema")?;

    let store = Arc::new(
        ReportStore::open(&config.reports.output_dir, config.reports.retention())
            .await
            .context("Failed to open report directory")?,
    );
    let cleanup = store.spawn_cleanup(config.reports.cleanup_interval());

    let generator = ReportGenerator::new(
        Arc::new(pool.clone()),
        ReportSettings {
            authority_name: config.reports.authority_name.clone(),
            province_display_name: config.reports.province_display_name.clone(),
        },
    );
    let settings = WebSettings {
        cors_allowed_origins: config.server.cors_allowed_origins.clone(),
        request_timeout: config.server.request_timeout(),
        max_upload_bytes: config.import.max_upload_bytes(),
    };
    let state = AppState {
        pool: pool.clone(),
        auth: Arc::new(AuthService::new(&config.auth.jwt_secret, config.auth.token_ttl_hours)),
        generator: Arc::new(generator),
        reports: store,
        settings: Arc::new(settings),
    };

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind_address()))?;
    info!("  Report directory: {}", config.reports.output_dir);
    info!("  Report retention: {} hours", config.reports.retention_hours);

    let result = WebServer::new(addr, state).run().await;
    cleanup.abort();
    pool.close().await;
    result.context("Web server stopped with an error")
}

async fn init_db(config: &DsrConfig) -> Result<()> {
    let pool = connect(config).await?;
    DatabaseQueries::new(&pool).create_tables().await?;
    info!("Database schema is ready");
    pool.close().await;
    Ok(())
}

async fn create_user(
    config: &DsrConfig,
    username: &str,
    password: &str,
    email: Option<String>,
    admin: bool,
    unit: Option<&str>,
) -> Result<()> {
    dsr_web::auth::validate_new_password(password)?;
    let pool = connect(config).await?;
    let queries = DatabaseQueries::new(&pool);
    if queries.get_user_by_username(username).await?.is_some() {
        anyhow::bail!("User already exists: {}", username);
    }

    let tree = UnitTree::new(queries.list_units().await?);
    let (role, unit_id) = if admin {
        (UserRole::Admin, tree.root().map(|u| u.id))
    } else {
        let key = unit.context("--unit is required for non-admin users")?;
        let found = match key.parse::<i64>() {
            Ok(id) => tree.get(id),
            Err(_) => tree.find_by_name(key, None),
        }
        .with_context(|| format!("Unit not found: {}", key))?;
        (UserRole::for_level(found.level), Some(found.id))
    };

    let id = queries
        .create_user(&NewUser {
            username: username.to_string(),
            email,
            password_hash: hash_password(password)?,
            role,
            unit_id,
        })
        .await?;
    info!("Created user {} (id={}, role={})", username, id, role);
    pool.close().await;
    Ok(())
}

async fn read_workbook(file: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

async fn import_units(config: &DsrConfig, file: &Path, replace: bool) -> Result<()> {
    let bytes = read_workbook(file).await?;
    let pool = connect(config).await?;
    DatabaseQueries::new(&pool).create_tables().await?;

    let outcome = Importer::new(&pool).import_units(bytes, replace).await?;
    for message in &outcome.errors {
        warn!("{}", message);
    }
    info!("Imported {} units from {}", outcome.inserted, file.display());
    pool.close().await;
    Ok(())
}

async fn import_cases(config: &DsrConfig, file: &Path) -> Result<()> {
    let bytes = read_workbook(file).await?;
    let pool = connect(config).await?;

    let today = chrono::Local::now().date_naive();
    let outcome = Importer::new(&pool).import_cases(bytes, None, today).await?;
    for row in &outcome.errors {
        warn!("{:?}", row);
    }
    info!("{}", outcome.message);
    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let args = Args::parse_from(["dsr-server"]);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_create_user_arguments() {
        let args = Args::parse_from(["dsr-server", "create-user", "admin", "matkhau123", "--admin"]);
        assert!(matches!(args.command, Some(Command::CreateUser { admin: true, unit: None, .. })));

        let args = Args::parse_from([
            "dsr-server",
            "--log-level",
            "debug",
            "create-user",
            "khuvuc_lx",
            "matkhau123",
            "--unit",
            "Khu vực Long Xuyên",
        ]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(matches!(args.command, Some(Command::CreateUser { admin: false, unit: Some(_), .. })));

        assert!(Args::try_parse_from(["dsr-server", "create-user", "x", "matkhau123"]).is_err());
    }

    #[test]
    fn test_import_units_arguments() {
        let args = Args::parse_from(["dsr-server", "import-units", "danh_muc.xlsx", "--replace"]);
        match args.command {
            Some(Command::ImportUnits { file, replace }) => {
                assert_eq!(file, PathBuf::from("danh_muc.xlsx"));
                assert!(replace);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
