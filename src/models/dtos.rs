// ============================================================================
// 数据传输对象（DTO）定义
// 选项文件、凭据文件、部署载荷与结果的数据结构，仅包含字段定义和序列化派生
// ⛔ 禁止：包含复杂的业务逻辑方法
// ============================================================================

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 默认 Metadata API 版本
pub const DEFAULT_API_VERSION: &str = "42.0";

/// 默认 HTTP 请求超时（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// 静态资源的 MIME 类型，归档始终是 ZIP
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// 单个过滤规则的原始值
///
/// JSON 字符串视为字面量，`{ "regex": "..." }` 视为正则。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum RuleValue {
    Literal(String),
    Pattern { regex: String },
}

/// include / exclude 选项的原始形态：单个值或值序列
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum RuleSpec {
    One(RuleValue),
    Many(Vec<RuleValue>),
}

/// 部署选项，从 JSON 选项文件反序列化而来
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeployOptions {
    /// 需要打包的根目录（必填）
    #[serde(default)]
    pub files_folder_path: Option<PathBuf>,
    /// 远程静态资源名称（必填）
    #[serde(default)]
    pub static_resource_name: Option<String>,
    /// 凭据 JSON 文件路径（必填）
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// 是否执行远程 upsert
    #[serde(default = "default_deploy")]
    pub deploy: bool,
    /// true 时 cacheControl 为 Public
    #[serde(default)]
    pub is_public: bool,
    /// 设置后额外写入 `<srcFolderPath>/staticresources/<name>.resource`
    #[serde(default)]
    pub src_folder_path: Option<PathBuf>,
    #[serde(default)]
    pub include: Option<RuleSpec>,
    #[serde(default)]
    pub exclude: Option<RuleSpec>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_deploy() -> bool {
    true
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            files_folder_path: None,
            static_resource_name: None,
            credentials_path: None,
            deploy: default_deploy(),
            is_public: false,
            src_folder_path: None,
            include: None,
            exclude: None,
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 远程服务凭据，构造时加载一次，此后只读
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// 追加在密码之后的安全令牌，兼容旧键名 `token`
    #[serde(default, alias = "token")]
    pub security_token: Option<String>,
    #[serde(default)]
    pub login_url: Option<String>,
}

// 日志中不能出现密码和令牌
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("security_token", &self.security_token.as_ref().map(|_| "***"))
            .field("login_url", &self.login_url)
            .finish()
    }
}

/// 静态资源的缓存可见性
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheControl {
    Public,
    Private,
}

impl CacheControl {
    pub fn from_public_flag(is_public: bool) -> Self {
        if is_public {
            CacheControl::Public
        } else {
            CacheControl::Private
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheControl::Public => "Public",
            CacheControl::Private => "Private",
        }
    }
}

/// 一次 upsert 的载荷，由唯一的归档生成
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPayload {
    pub full_name: String,
    /// base64 编码的 ZIP 内容
    pub content: String,
    pub content_type: String,
    pub cache_control: CacheControl,
}

/// 远程 upsert 返回的单条结果
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub full_name: String,
    pub created: bool,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_message: Option<String>,
}

/// 外部构建工具报告的构建完成状态
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    pub had_errors: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl BuildStatus {
    pub fn succeeded() -> Self {
        Self::default()
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            had_errors: true,
            errors,
        }
    }
}
