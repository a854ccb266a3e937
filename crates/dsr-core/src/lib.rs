//! # DSR Core
//!
//! 传染病监测报告系统的核心模块，提供领域模型、错误定义、行政区划树、
//! 报告周历以及报表数据源接口。

pub mod calendar;
pub mod catalog;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod source;
pub mod utils;

pub use calendar::{DateRange, PeriodWindow, ReportPeriod, Week, WeekCalendar};
pub use error::{DsrError, Result};
pub use hierarchy::{Grouping, ReportingUnits, UnitTree};
pub use models::*;
pub use source::{MemorySource, ReportDataSource};
