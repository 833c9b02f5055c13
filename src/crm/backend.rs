//! 后端 HTTP 接口
//!
//! 会话协调器与同步监视器只依赖 [`CrmBackend`]，真实实现 [`HttpBackend`]
//! 的请求全部经过认证拦截器发送。

use crate::crm::config::{endpoints, ClientConfig};
use crate::crm::error::SyncError;
use crate::crm::token::RequestInterceptor;
use crate::crm::types::{
    ForceSyncResp, StatusCredentials, StoreTokenReq, StoreTokenResp, SyncCredentials,
    SyncStatusResp,
};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 后端接口边界
#[async_trait]
pub trait CrmBackend: Send + Sync {
    /// 查询后台同步状态
    async fn sync_status(&self, creds: &StatusCredentials) -> Result<SyncStatusResp, SyncError>;

    /// 手动触发邮件同步
    async fn force_sync_emails(&self, creds: &SyncCredentials) -> Result<ForceSyncResp, SyncError>;

    /// 把委托 token 交给服务端保存
    async fn store_token(
        &self,
        identity_token: &str,
        delegated_token: &str,
    ) -> anyhow::Result<StoreTokenResp>;
}

/// 基于 reqwest 的后端实现
pub struct HttpBackend {
    config: ClientConfig,
    interceptor: Arc<RequestInterceptor>,
}

impl HttpBackend {
    pub fn new(config: ClientConfig, interceptor: Arc<RequestInterceptor>) -> Self {
        Self {
            config,
            interceptor,
        }
    }
}

/// 读取 body 并反序列化，返回 HTTP 状态和解析结果
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<(StatusCode, Result<T, serde_json::Error>), SyncError> {
    let status = response.status();
    let body_bytes = response.bytes().await.map_err(|e| {
        error!("[Backend] {}读取响应 body 失败: {}", operation_name, e);
        SyncError::Endpoint(format!("Failed to read response: {}", e))
    })?;
    debug!(
        "[Backend] {}响应 HTTP状态: {}, Body: {}",
        operation_name,
        status,
        String::from_utf8_lossy(&body_bytes)
    );
    Ok((status, serde_json::from_slice::<T>(&body_bytes)))
}

#[async_trait]
impl CrmBackend for HttpBackend {
    async fn sync_status(&self, creds: &StatusCredentials) -> Result<SyncStatusResp, SyncError> {
        let url = self.config.url(endpoints::SYNC_STATUS);
        debug!("[Backend] 📡 查询同步状态: {}", url);

        let client = self.interceptor.client();
        let response = client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", creds.identity_token))
            .header("X-User-ID", &creds.user_id)
            .header("X-Request-ID", Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| SyncError::Endpoint(format!("Error checking sync status: {}", e)))?;

        let (status, parsed) = read_json::<SyncStatusResp>(response, "同步状态").await?;
        let resp = parsed.map_err(|e| {
            error!("[Backend] 同步状态反序列化失败: {:?}", e);
            SyncError::Endpoint("Invalid response format".to_string())
        })?;

        if !status.is_success() || !resp.success {
            let message = resp
                .message
                .clone()
                .unwrap_or_else(|| format!("HTTP {}", status));
            warn!("[Backend] 同步状态接口返回失败: {}", message);
            return Err(SyncError::Endpoint(message));
        }
        Ok(resp)
    }

    async fn force_sync_emails(&self, creds: &SyncCredentials) -> Result<ForceSyncResp, SyncError> {
        let url = self.config.url(endpoints::FORCE_SYNC_EMAILS);
        let operation_id = Uuid::new_v4().to_string();
        info!("[Backend] 📡 请求手动邮件同步");
        debug!(
            "[Backend]   请求URL: {}, 用户ID: {}, 操作ID: {}",
            url, creds.user_id, operation_id
        );

        let client = self.interceptor.client();
        let response = client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", creds.identity_token))
            .header("X-Google-Token", &creds.delegated_token)
            .header("X-User-ID", &creds.user_id)
            .header("X-Request-ID", &operation_id)
            .send()
            .await
            .map_err(|e| SyncError::Endpoint(e.to_string()))?;

        // 服务端在 4xx/5xx 时同样返回 {success, message}，按 body 为准
        let (status, parsed) = read_json::<ForceSyncResp>(response, "手动同步").await?;
        match parsed {
            Ok(resp) => Ok(resp),
            Err(e) => {
                error!(
                    "[Backend] 手动同步响应不是合法 JSON，HTTP状态: {}, 错误: {:?}",
                    status, e
                );
                Err(SyncError::Endpoint("Invalid response format".to_string()))
            }
        }
    }

    async fn store_token(
        &self,
        identity_token: &str,
        delegated_token: &str,
    ) -> anyhow::Result<StoreTokenResp> {
        let url = self.config.url(endpoints::STORE_TOKEN);
        info!("[Backend] 📡 上传委托 token 到服务端");

        let client = self.interceptor.client();
        let response = client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", identity_token))
            .json(&StoreTokenReq {
                token: delegated_token,
            })
            .send()
            .await
            .context("请求失败")?;

        let status = response.status();
        let resp: StoreTokenResp = response
            .json()
            .await
            .context(format!("解析 store-token 响应失败，HTTP状态: {}", status))?;
        Ok(resp)
    }
}
