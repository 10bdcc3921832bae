// ============================================================================
// [总线] 程序的组装车间
// ✅ 只能做：pub mod 暴露子模块、组装编排器与构建通知源
// ⛔ 禁止：直接实现打包或部署逻辑
// ============================================================================

pub mod commands;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use commands::build_hook::{CommandBuild, FinishedBuild};
use commands::orchestrator::{CycleOutcome, Orchestrator};
use models::dtos::{BuildStatus, DeployOptions};
use utils::error::AppResult;

/// 构建完成通知的来源
#[derive(Debug, Clone)]
pub enum Trigger {
    /// 外部构建已经结束，状态已知
    Finished(BuildStatus),
    /// 先运行构建命令，再按其退出状态通知
    Command { program: String, args: Vec<String> },
}

// ============================================================================
// 应用入口
// ============================================================================

/// 构造编排器、注册完成回调并触发一次构建完成通知
///
/// 返回 Err 表示致命错误（登录失败或被取消）。
pub fn run(options: &DeployOptions, trigger: Trigger) -> AppResult<Vec<CycleOutcome>> {
    let orchestrator = Arc::new(Orchestrator::from_options(options)?);

    match trigger {
        Trigger::Finished(status) => {
            let mut build = FinishedBuild::new(status);
            orchestrator.apply(&mut build);
            build.finish()
        }
        Trigger::Command { program, args } => {
            let mut build = CommandBuild::new(program, args);
            orchestrator.apply(&mut build);
            build.run()
        }
    }
}
