//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责组装和调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 创建 HTTP 执行器和所有协作方客户端
//! - 读取拍照文件夹，驱动拍照流程（上传 → 计数 → 保存）
//! - 输出全局统计信息
//!
//! ### `report_processor` - 报表汇总
//! - 分页读取最近 7 天的记录
//! - 会话分组、日期分组、合计
//! - 通过签名缓存解析访问链接
//!
//! ## 层次关系
//!
//! ```text
//! app (拍照文件夹 + 报表)
//!     ↓
//! workflow::CaptureFlow (一批照片)      report_processor (报表汇总)
//!     ↓                                      ↓
//! services (上传 / 计数 / 提交 / 签名缓存 / 会话聚合)
//!     ↓
//! clients + infrastructure (HttpExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层创建 HTTP 客户端
//! 2. **向下依赖**：编排层 → workflow → services → clients → infrastructure
//! 3. **无业务逻辑**：只做组装、调度和统计

pub mod app;
pub mod report_processor;

// 重新导出主要类型
pub use app::{App, Collaborators, RunSummary};
pub use report_processor::{load_report, ReportOverview};
