// ============================================================================
// 配置校验服务：把原始选项转换为已校验配置，或返回全部问题
// 纯 Rust 函数，方便单元测试
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::dtos::{CacheControl, Credentials, DeployOptions, RuleSpec};
use crate::services::deployer::{local_target, PayloadSpec};
use crate::services::path_filter::{configure, FilterConfiguration};
use crate::utils::error::{AppError, AppResult};

/// 通过校验的部署配置，构造后只读
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub files_folder_path: PathBuf,
    pub static_resource_name: String,
    pub credentials: Credentials,
    pub deploy: bool,
    pub cache_control: CacheControl,
    /// `srcFolderPath` 设置时的本地写入目标
    pub local_target: Option<PathBuf>,
    pub include: Option<RuleSpec>,
    pub exclude: Option<RuleSpec>,
    pub api_version: String,
    pub timeout: Duration,
}

impl ValidatedConfig {
    /// 为当前构建周期推导过滤配置
    pub fn filter(&self) -> AppResult<FilterConfiguration> {
        configure(self.include.as_ref(), self.exclude.as_ref())
    }

    pub fn payload_spec(&self) -> PayloadSpec {
        PayloadSpec {
            full_name: self.static_resource_name.clone(),
            cache_control: self.cache_control,
        }
    }
}

/// 从 JSON 文件加载部署选项
pub fn load_options(path: &Path) -> AppResult<DeployOptions> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::Options(format!("无法读取 {}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| AppError::Options(format!("无法解析 {}: {}", path.display(), e)))
}

/// 从 JSON 文件加载凭据
pub fn load_credentials(path: &Path) -> AppResult<Credentials> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::Configuration(vec![format!(
            "credentials were not found at: {} ({})",
            path.display(),
            e
        )])
    })?;
    serde_json::from_str(&text).map_err(|e| {
        AppError::Configuration(vec![format!(
            "credentials at {} are invalid: {}",
            path.display(),
            e
        )])
    })
}

/// 校验选项并收集所有问题，不在第一个问题处短路
pub fn validate(options: &DeployOptions) -> Result<ValidatedConfig, Vec<String>> {
    let mut problems = Vec::new();

    let files_folder_path = options
        .files_folder_path
        .clone()
        .filter(|p| !p.as_os_str().is_empty());
    if files_folder_path.is_none() {
        problems.push("\"filesFolderPath\" is required!".to_string());
    }

    let static_resource_name = options
        .static_resource_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    if static_resource_name.is_none() {
        problems.push("\"staticResourceName\" is required!".to_string());
    }

    let credentials = match &options.credentials_path {
        Some(path) => match load_credentials(path) {
            Ok(creds) => Some(creds),
            Err(AppError::Configuration(msgs)) => {
                problems.extend(msgs);
                None
            }
            Err(other) => {
                problems.push(other.to_string());
                None
            }
        },
        None => {
            problems.push("credentials were not found at: <unset credentialsPath>".to_string());
            None
        }
    };

    if let Err(e) = configure(options.include.as_ref(), options.exclude.as_ref()) {
        match e {
            AppError::Configuration(msgs) => problems.extend(msgs),
            other => problems.push(other.to_string()),
        }
    }

    match (files_folder_path, static_resource_name, credentials) {
        (Some(files_folder_path), Some(static_resource_name), Some(credentials)) if problems.is_empty() => {
            let local_target = options
                .src_folder_path
                .as_deref()
                .map(|src| local_target(src, &static_resource_name));
            Ok(ValidatedConfig {
                files_folder_path,
                static_resource_name,
                credentials,
                deploy: options.deploy,
                cache_control: CacheControl::from_public_flag(options.is_public),
                local_target,
                include: options.include.clone(),
                exclude: options.exclude.clone(),
                api_version: options.api_version.clone(),
                timeout: Duration::from_secs(options.timeout_secs),
            })
        }
        _ => Err(problems),
    }
}

// ============================================================================
// 单元测试
// ============================================================================
