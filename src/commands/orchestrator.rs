// ============================================================================
// 部署编排：校验配置 → 打包 → 本地写入 / 远程部署 → 报告
// 负责：响应构建完成通知，驱动一次完整的部署周期
// ============================================================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::commands::build_hook::BuildCompletionSource;
use crate::models::dtos::{BuildStatus, DeployOptions};
use crate::services::deployer::{authenticate_and_upsert, write_local, DeployReport};
use crate::services::metadata_client::{MetadataService, SoapMetadataClient};
use crate::services::packer::build_archive;
use crate::services::validator::{validate, ValidatedConfig};
use crate::utils::cancel::CancelFlag;
use crate::utils::error::{AppError, AppResult};

/// 部署周期所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validated,
    Invalid,
    Building,
    Skipped,
    WritingLocal,
    Deploying,
    Done,
}

/// 一次构建完成通知的非致命结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 上游构建失败，未打包
    UpstreamFailed(Vec<String>),
    /// 配置无效，周期未运行
    InvalidConfiguration(Vec<String>),
    /// 遍历或读取文件失败，未部署
    ArchiveFailed(String),
    /// 归档没有文件，未调用远程也未写本地
    Skipped,
    Completed {
        /// `deploy` 关闭时为 None
        deployment: Option<DeployReport>,
        /// 未配置 `srcFolderPath` 时为 None
        local_write: Option<Result<PathBuf, String>>,
    },
}

pub struct Orchestrator {
    config: Result<ValidatedConfig, Vec<String>>,
    service: Box<dyn MetadataService + Send + Sync>,
    cancel: CancelFlag,
    cycle_lock: Mutex<()>,
    phase: Mutex<Phase>,
}

impl Orchestrator {
    /// 构造时同步校验配置：从 Idle 进入 Validated，或在问题累积后进入 Invalid
    pub fn new(options: &DeployOptions, service: Box<dyn MetadataService + Send + Sync>) -> Self {
        let orchestrator = Self {
            config: validate(options),
            service,
            cancel: CancelFlag::new(),
            cycle_lock: Mutex::new(()),
            phase: Mutex::new(Phase::Idle),
        };

        match &orchestrator.config {
            Ok(_) => orchestrator.set_phase(Phase::Validated),
            Err(problems) => {
                log::debug!("配置校验发现 {} 个问题", problems.len());
                orchestrator.set_phase(Phase::Invalid);
            }
        }
        orchestrator
    }

    /// 使用 SOAP 客户端构造
    pub fn from_options(options: &DeployOptions) -> AppResult<Self> {
        let client = SoapMetadataClient::new(&options.api_version, Duration::from_secs(options.timeout_secs))?;
        Ok(Self::new(options, Box::new(client)))
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 取消标记；置位后当前及后续周期以 `AppError::Cancelled` 结束，直到复位
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn set_phase(&self, phase: Phase) {
        log::debug!("部署阶段 -> {:?}", phase);
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
    }

    /// 向构建工具注册完成回调
    pub fn apply(self: &Arc<Self>, source: &mut dyn BuildCompletionSource) {
        let this = Arc::clone(self);
        source.register(Box::new(move |status: &BuildStatus| this.handle_build_done(status)));
    }

    /// 处理一次构建完成通知
    ///
    /// 只有登录失败与取消以 `Err` 返回，其余失败都记录日志并体现在 `CycleOutcome` 中。
    pub fn handle_build_done(&self, status: &BuildStatus) -> AppResult<CycleOutcome> {
        // 同一实例的周期串行执行
        let _cycle = self.cycle_lock.lock().unwrap_or_else(|p| p.into_inner());
        let _done = scopeguard::guard((), |_| self.set_phase(Phase::Done));

        if status.had_errors {
            log::warn!("{}", AppError::UpstreamBuild(status.errors.clone()));
            print_errors(&status.errors);
            return Ok(CycleOutcome::UpstreamFailed(status.errors.clone()));
        }

        let config = match &self.config {
            Ok(config) => config,
            Err(problems) => {
                print_errors(problems);
                return Ok(CycleOutcome::InvalidConfiguration(problems.clone()));
            }
        };
        self.set_phase(Phase::Validated);
        self.cancel.check()?;

        self.set_phase(Phase::Building);
        let archive = match config
            .filter()
            .and_then(|filter| build_archive(&config.files_folder_path, &filter, &self.cancel))
        {
            Ok(archive) => archive,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::error!("ERROR: {}", e);
                return Ok(CycleOutcome::ArchiveFailed(e.to_string()));
            }
        };
        log::debug!("归档摘要 {}", archive.digest());

        if archive.is_empty() {
            log::info!("{} 中没有需要部署的文件，跳过", config.files_folder_path.display());
            self.set_phase(Phase::Skipped);
            return Ok(CycleOutcome::Skipped);
        }

        // 本地写入不受远程步骤影响，先于登录执行
        let local_write = config.local_target.as_ref().map(|target| {
            self.set_phase(Phase::WritingLocal);
            write_local(&archive, target).map_err(|e| {
                log::error!("ERROR: {}", e);
                e.to_string()
            })
        });

        let deployment = if config.deploy {
            self.set_phase(Phase::Deploying);
            let report = match authenticate_and_upsert(
                self.service.as_ref(),
                &archive,
                &config.payload_spec(),
                &config.credentials,
                &self.cancel,
            ) {
                Ok(report) => report,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("ERROR: {}", e);
                    DeployReport::UpsertFailed(e.to_string())
                }
            };
            Some(report)
        } else {
            log::info!("deploy 已关闭，跳过远程 upsert");
            None
        };

        Ok(CycleOutcome::Completed {
            deployment,
            local_write,
        })
    }
}

fn print_errors(errors: &[String]) {
    for err in errors {
        log::error!("ERROR: {}", err);
    }
}

// ============================================================================
// 单元测试
// ============================================================================
