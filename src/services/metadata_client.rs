// ============================================================================
// Metadata 客户端服务：与 Salesforce SOAP API 通信
// ✅ 只能做：HTTP 请求、SOAP 报文拼装与解析
// ⛔ 禁止：遍历文件、决定部署流程
// ============================================================================

use std::time::Duration;

use quick_xml::de::from_str;
use quick_xml::escape::escape;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::dtos::{DeploymentPayload, DeploymentResult};
use crate::utils::error::{AppError, AppResult};

/// 未配置 loginUrl 时使用的生产环境登录地址
pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";

/// 登录成功后的会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub metadata_server_url: String,
}

/// 远程元数据服务：先登录，再 upsert
///
/// 核心流程只依赖这个 trait，测试中可以替换为内存实现。
pub trait MetadataService {
    fn authenticate(&self, username: &str, password: &str, login_url: &str) -> AppResult<Session>;

    fn upsert(
        &self,
        session: &Session,
        resource_type: &str,
        payloads: &[DeploymentPayload],
    ) -> AppResult<Vec<DeploymentResult>>;
}

/// 基于 reqwest 阻塞客户端的 SOAP 实现
pub struct SoapMetadataClient {
    client: reqwest::blocking::Client,
    api_version: String,
}

impl SoapMetadataClient {
    pub fn new(api_version: &str, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(vec![format!("无法创建 HTTP 客户端：{}", e)]))?;
        Ok(Self {
            client,
            api_version: api_version.to_string(),
        })
    }

    /// 发送一次 SOAP 请求，返回响应正文与是否 2xx
    fn post_soap(&self, url: &str, action: &str, body: String) -> Result<(bool, String), String> {
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPAction", action)
            .body(body)
            .send()
            .map_err(|e| format!("请求 {} 失败：{}", url, e))?;

        let ok = resp.status().is_success();
        let text = resp
            .text()
            .map_err(|e| format!("读取 {} 响应失败：{}", url, e))?;
        Ok((ok, text))
    }
}

impl MetadataService for SoapMetadataClient {
    fn authenticate(&self, username: &str, password: &str, login_url: &str) -> AppResult<Session> {
        let url = login_endpoint(login_url, &self.api_version);
        log::info!("正在登录 {} ({})", url, username);

        let (ok, text) = self
            .post_soap(&url, "login", login_envelope(username, password))
            .map_err(AppError::Authentication)?;

        if !ok {
            return Err(AppError::Authentication(fault_reason(text)));
        }

        parse_login_response(&text).map_err(AppError::Authentication)
    }

    fn upsert(
        &self,
        session: &Session,
        resource_type: &str,
        payloads: &[DeploymentPayload],
    ) -> AppResult<Vec<DeploymentResult>> {
        let body = upsert_envelope(&session.session_id, resource_type, payloads);
        let (ok, text) = self
            .post_soap(&session.metadata_server_url, "upsertMetadata", body)
            .map_err(AppError::Upsert)?;

        if !ok {
            return Err(AppError::Upsert(fault_reason(text)));
        }

        parse_upsert_response(&text).map_err(AppError::Upsert)
    }
}

/// partner 登录端点，兼容 loginUrl 末尾有无斜杠
pub fn login_endpoint(login_url: &str, api_version: &str) -> String {
    format!("{}/services/Soap/u/{}", login_url.trim_end_matches('/'), api_version)
}

// ============================================================================
// SOAP 报文拼装
// ============================================================================

fn login_envelope(username: &str, password: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:urn="urn:partner.soap.sforce.com">"#,
            r#"<soapenv:Body><urn:login><urn:username>{}</urn:username><urn:password>{}</urn:password></urn:login></soapenv:Body>"#,
            r#"</soapenv:Envelope>"#
        ),
        escape(username),
        escape(password)
    )
}

fn upsert_envelope(session_id: &str, resource_type: &str, payloads: &[DeploymentPayload]) -> String {
    let metadata: String = payloads
        .iter()
        .map(|p| {
            format!(
                concat!(
                    r#"<met:metadata xsi:type="met:{}">"#,
                    "<met:fullName>{}</met:fullName>",
                    "<met:cacheControl>{}</met:cacheControl>",
                    "<met:content>{}</met:content>",
                    "<met:contentType>{}</met:contentType>",
                    "</met:metadata>"
                ),
                escape(resource_type),
                escape(p.full_name.as_str()),
                p.cache_control.as_str(),
                p.content,
                escape(p.content_type.as_str())
            )
        })
        .collect();

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:met="http://soap.sforce.com/2006/04/metadata">"#,
            "<soapenv:Header><met:SessionHeader><met:sessionId>{}</met:sessionId></met:SessionHeader></soapenv:Header>",
            "<soapenv:Body><met:upsertMetadata>{}</met:upsertMetadata></soapenv:Body>",
            "</soapenv:Envelope>"
        ),
        escape(session_id),
        metadata
    )
}

// ============================================================================
// SOAP 响应解析（quick-xml 反序列化时忽略命名空间前缀与未知元素）
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<B> {
    #[serde(rename = "Body")]
    body: B,
}

#[derive(Debug, Deserialize)]
struct Fault {
    faultstring: String,
}

#[derive(Debug, Deserialize)]
struct FaultBody {
    #[serde(rename = "Fault")]
    fault: Option<Fault>,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(rename = "loginResponse")]
    login_response: Option<LoginResponse>,
    #[serde(rename = "Fault")]
    fault: Option<Fault>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    result: LoginResult,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "metadataServerUrl")]
    metadata_server_url: String,
}

#[derive(Debug, Deserialize)]
struct UpsertBody {
    #[serde(rename = "upsertMetadataResponse")]
    upsert_response: Option<UpsertResponse>,
    #[serde(rename = "Fault")]
    fault: Option<Fault>,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(default)]
    result: Vec<UpsertResult>,
}

#[derive(Debug, Deserialize)]
struct UpsertResult {
    #[serde(rename = "fullName", default)]
    full_name: String,
    #[serde(default)]
    created: bool,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<UpsertError>,
}

#[derive(Debug, Deserialize)]
struct UpsertError {
    #[serde(default)]
    message: String,
}

impl From<UpsertResult> for DeploymentResult {
    fn from(raw: UpsertResult) -> Self {
        let messages: Vec<String> = raw
            .errors
            .into_iter()
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .collect();

        DeploymentResult {
            full_name: raw.full_name,
            created: raw.created,
            success: raw.success,
            diagnostic_message: if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            },
        }
    }
}

fn parse_body<B: DeserializeOwned>(xml: &str) -> Result<B, String> {
    from_str::<Envelope<B>>(xml)
        .map(|envelope| envelope.body)
        .map_err(|e| format!("无法解析 SOAP 响应：{}", e))
}

/// 非 2xx 响应的失败原因：faultstring，解析不出时使用原始正文
fn fault_reason(text: String) -> String {
    match parse_body::<FaultBody>(&text) {
        Ok(FaultBody { fault: Some(fault) }) => fault.faultstring,
        _ => text,
    }
}

fn parse_login_response(xml: &str) -> Result<Session, String> {
    let body: LoginBody = parse_body(xml)?;
    if let Some(fault) = body.fault {
        return Err(fault.faultstring);
    }

    let result = body
        .login_response
        .ok_or_else(|| "登录响应缺少 loginResponse".to_string())?
        .result;
    Ok(Session {
        session_id: result.session_id,
        metadata_server_url: result.metadata_server_url,
    })
}

fn parse_upsert_response(xml: &str) -> Result<Vec<DeploymentResult>, String> {
    let body: UpsertBody = parse_body(xml)?;
    if let Some(fault) = body.fault {
        return Err(fault.faultstring);
    }

    let response = body
        .upsert_response
        .ok_or_else(|| "upsert 响应缺少 upsertMetadataResponse".to_string())?;
    Ok(response.result.into_iter().map(DeploymentResult::from).collect())
}
