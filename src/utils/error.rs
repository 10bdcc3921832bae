// ============================================================================
// 统一错误类型定义
// 使用 thiserror 派生宏，每个变体对应部署周期中的一类失败
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// 应用统一错误枚举
///
/// 只有 `Authentication` 和 `Cancelled` 会从一次构建周期中以 `Err` 逃逸，
/// 其余错误在发现处记录日志并折叠进 `CycleOutcome`。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置校验失败（缺少必填项、凭据文件无法解析、正则无法编译）
    #[error("配置无效：{}", .0.join("; "))]
    Configuration(Vec<String>),

    /// 上游构建本身失败
    #[error("上游构建失败：{}", .0.join("; "))]
    UpstreamBuild(Vec<String>),

    /// 遍历目录或读取文件失败
    #[error("文件系统错误 {}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ZIP 序列化失败
    #[error("打包 ZIP 时出错：{0}")]
    Archive(String),

    /// 远程登录失败（致命）
    #[error("登录失败：{0}")]
    Authentication(String),

    /// 远程 upsert 调用失败（非致命）
    #[error("upsert 失败：{0}")]
    Upsert(String),

    /// 本地写入归档失败（非致命）
    #[error("写入本地归档失败 {}: {source}", .path.display())]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 选项文件无法读取或解析
    #[error("选项文件无效：{0}")]
    Options(String),

    /// 构建周期被取消
    #[error("cancelled")]
    Cancelled,
}

impl AppError {
    /// 是否为会终止进程的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Authentication(_) | AppError::Cancelled)
    }
}

/// 便捷类型别名，统一项目内的 Result 签名
pub type AppResult<T> = Result<T, AppError>;
