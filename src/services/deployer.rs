// ============================================================================
// 部署服务：归档 → 载荷 → 登录 → upsert，以及本地写入
// ✅ 只能做：组装载荷、按顺序调用 MetadataService、写本地归档
// ⛔ 禁止：直接发 HTTP 请求（交给 MetadataService）
// ============================================================================

use std::path::{Path, PathBuf};

use crate::models::dtos::{CacheControl, Credentials, DeploymentPayload, DeploymentResult, ZIP_CONTENT_TYPE};
use crate::services::metadata_client::{MetadataService, DEFAULT_LOGIN_URL};
use crate::services::packer::Archive;
use crate::utils::cancel::CancelFlag;
use crate::utils::error::{AppError, AppResult};

/// upsert 使用的元数据类型
pub const STATIC_RESOURCE_TYPE: &str = "StaticResource";

const DELIMITER: &str = "\n======================================================\n";

/// 载荷的静态部分：资源名与缓存可见性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSpec {
    pub full_name: String,
    pub cache_control: CacheControl,
}

/// 一次远程部署的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployReport {
    /// 归档没有文件，未发起任何远程调用
    NothingToDeploy,
    /// upsert 返回了结果（可能 success=false）
    Upserted(DeploymentResult),
    /// upsert 调用本身失败，已记录日志
    UpsertFailed(String),
}

/// 由归档构建唯一的载荷；归档没有文件时返回 None
pub fn build_payload(archive: &Archive, spec: &PayloadSpec) -> AppResult<Option<DeploymentPayload>> {
    if archive.is_empty() {
        return Ok(None);
    }

    Ok(Some(DeploymentPayload {
        full_name: spec.full_name.clone(),
        content: archive.to_base64()?,
        content_type: ZIP_CONTENT_TYPE.to_string(),
        cache_control: spec.cache_control,
    }))
}

/// 登录后 upsert 一个静态资源
///
/// 登录失败以 `AppError::Authentication` 返回，调用方不应吞掉；
/// upsert 失败只记录日志并返回 `DeployReport::UpsertFailed`。
pub fn authenticate_and_upsert(
    service: &dyn MetadataService,
    archive: &Archive,
    spec: &PayloadSpec,
    credentials: &Credentials,
    cancel: &CancelFlag,
) -> AppResult<DeployReport> {
    let payload = match build_payload(archive, spec)? {
        Some(payload) => payload,
        None => return Ok(DeployReport::NothingToDeploy),
    };

    cancel.check()?;
    let password = format!(
        "{}{}",
        credentials.password,
        credentials.security_token.as_deref().unwrap_or("")
    );
    let login_url = credentials.login_url.as_deref().unwrap_or(DEFAULT_LOGIN_URL);
    let session = service.authenticate(&credentials.username, &password, login_url)?;

    cancel.check()?;
    match service.upsert(&session, STATIC_RESOURCE_TYPE, std::slice::from_ref(&payload)) {
        Ok(results) => match results.into_iter().next() {
            Some(result) => {
                report_result(&result);
                Ok(DeployReport::Upserted(result))
            }
            None => {
                let msg = format!("upsert 没有返回 {} 的结果", spec.full_name);
                log::error!("{}", msg);
                Ok(DeployReport::UpsertFailed(msg))
            }
        },
        Err(e) => {
            log::error!("{}", e);
            Ok(DeployReport::UpsertFailed(e.to_string()))
        }
    }
}

/// 格式化 upsert 结果：创建、更新，或原样输出失败结果
pub fn format_result(result: &DeploymentResult) -> String {
    let success_msg = format!(
        "{}The Static Resource: \"{}\" was successfully ",
        DELIMITER, result.full_name
    );
    if result.created && result.success {
        format!("{}created!{}", success_msg, DELIMITER)
    } else if result.success {
        format!("{}updated!{}", success_msg, DELIMITER)
    } else {
        format!("{:?}", result)
    }
}

fn report_result(result: &DeploymentResult) {
    if result.success {
        log::info!("{}", format_result(result));
    } else {
        log::warn!("{}", format_result(result));
    }
}

/// 本地归档目标路径：`<src_folder>/staticresources/<name>.resource`
pub fn local_target(src_folder: &Path, resource_name: &str) -> PathBuf {
    src_folder
        .join("staticresources")
        .join(format!("{}.resource", resource_name))
}

/// 将归档的 ZIP 字节写入目标路径，覆盖已有文件
///
/// 先写入同目录的临时文件再重命名，失败时由 scopeguard 清理临时文件。
pub fn write_local(archive: &Archive, target: &Path) -> AppResult<PathBuf> {
    let bytes = archive.to_zip_bytes()?;
    let local_err = |source: std::io::Error| AppError::LocalWrite {
        path: target.to_path_buf(),
        source,
    };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(local_err)?;
    }

    let tmp_path = target.with_extension("resource.tmp");
    let guard = scopeguard::guard(tmp_path.clone(), |path| {
        let _ = std::fs::remove_file(path);
    });

    std::fs::write(&tmp_path, &bytes).map_err(local_err)?;
    std::fs::rename(&tmp_path, target).map_err(local_err)?;
    // 重命名成功，临时文件已不存在
    scopeguard::ScopeGuard::into_inner(guard);

    log::info!("已写入本地归档 {}（{} 字节）", target.display(), bytes.len());
    Ok(target.to_path_buf())
}

// ============================================================================
// 单元测试
// ============================================================================
