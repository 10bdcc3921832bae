// ============================================================================
// 文件过滤服务：include / exclude 规则归一化与单文件判定
// 纯 Rust 函数，方便单元测试
// ============================================================================

use regex::Regex;

use crate::models::dtos::{RuleSpec, RuleValue};
use crate::utils::error::{AppError, AppResult};

/// 单条过滤规则：字面量精确匹配或正则查找
#[derive(Debug, Clone)]
pub enum FilterRule {
    Literal(String),
    Pattern(Regex),
}

impl FilterRule {
    /// 规则是否命中文件名（不考虑模式极性）
    fn hits(&self, file_name: &str) -> bool {
        match self {
            FilterRule::Literal(literal) => literal == file_name,
            FilterRule::Pattern(re) => re.is_match(file_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Include,
    Exclude,
    Passthrough,
}

/// 一次构建周期使用的过滤配置
#[derive(Debug, Clone)]
pub struct FilterConfiguration {
    pub mode: FilterMode,
    pub rules: Vec<FilterRule>,
}

impl FilterConfiguration {
    pub fn passthrough() -> Self {
        Self {
            mode: FilterMode::Passthrough,
            rules: Vec::new(),
        }
    }
}

/// 将原始规则值（缺省 / 单值 / 序列）归一化为有序规则序列
pub fn normalize(spec: Option<&RuleSpec>) -> AppResult<Vec<FilterRule>> {
    let values: Vec<&RuleValue> = match spec {
        None => Vec::new(),
        Some(RuleSpec::One(value)) => vec![value],
        Some(RuleSpec::Many(values)) => values.iter().collect(),
    };

    values
        .into_iter()
        .map(|value| match value {
            RuleValue::Literal(s) => Ok(FilterRule::Literal(s.clone())),
            RuleValue::Pattern { regex } => Regex::new(regex)
                .map(FilterRule::Pattern)
                .map_err(|e| AppError::Configuration(vec![format!("无效的正则 {}: {}", regex, e)])),
        })
        .collect()
}

/// 由 include / exclude 选项推导过滤配置
///
/// include 非空时只使用 include 规则，exclude 被忽略；
/// 否则 exclude 非空时为排除模式；两者都为空时全部放行。
pub fn configure(include: Option<&RuleSpec>, exclude: Option<&RuleSpec>) -> AppResult<FilterConfiguration> {
    let include_rules = normalize(include)?;
    if !include_rules.is_empty() {
        return Ok(FilterConfiguration {
            mode: FilterMode::Include,
            rules: include_rules,
        });
    }

    let exclude_rules = normalize(exclude)?;
    if !exclude_rules.is_empty() {
        return Ok(FilterConfiguration {
            mode: FilterMode::Exclude,
            rules: exclude_rules,
        });
    }

    Ok(FilterConfiguration::passthrough())
}

/// 判定单个文件名是否进入归档
///
/// 任一规则满足 `命中 == (模式为 include)` 即接受。
/// 排除模式下一条未命中的规则同样算作满足，这是既定行为。
pub fn accepts(file_name: &str, config: &FilterConfiguration) -> bool {
    let want_hit = match config.mode {
        FilterMode::Passthrough => return true,
        FilterMode::Include => true,
        FilterMode::Exclude => false,
    };

    config
        .rules
        .iter()
        .any(|rule| rule.hits(file_name) == want_hit)
}

// ============================================================================
// 单元测试
// ============================================================================
