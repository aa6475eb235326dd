//! # Gem Tally
//!
//! 珠宝照片计数流水线：上传照片、调用计数服务、复核后保存报表，
//! 并按上传者会话汇总已保存的记录。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - `HttpExecutor`，唯一的 HTTP Client 持有者，负责认证和状态码映射
//! - `clients/` - 外部协作方 trait（对象存储、签名、计数、报表、用户）及其 HTTP 实现
//!
//! ### ② 业务能力层（Services）
//! - `FileValidator` - 文件类型和大小校验
//! - `UploadOrchestrator` - 并发上传与进度事件
//! - `ResolverCache` - 签名链接缓存，合并并发请求
//! - `ProcessingCoordinator` - 计数请求与结果对应
//! - `ReportSubmissionGateway` - 报表提交
//! - `session_aggregator` - 游标分页、会话分组、合计
//!
//! ### ③ 流程层（Workflow）
//! - `CaptureFlow` - 选择 → 上传 → 计数 → 复核 → 保存
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 组装依赖，驱动拍照流程和报表汇总
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::HttpExecutor;
pub use orchestrator::{App, Collaborators, RunSummary};
pub use services::{
    FileValidator, ProcessingCoordinator, ReportFeed, ReportSubmissionGateway, ResolverCache,
    UploadOrchestrator,
};
pub use workflow::{CaptureFlow, CaptureStage};
