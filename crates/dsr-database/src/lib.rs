//! # DSR数据库模块
//!
//! 负责行政单位、用户、病例和疫点的存储，提供PostgreSQL连接池、建表、
//! CRUD查询以及报表数据源实现。

pub mod connection;
pub mod models;
pub mod queries;
pub mod report_source;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use models::*;
pub use queries::DatabaseQueries;
