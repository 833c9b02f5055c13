//! 联系人 HTTP API 客户端
//!
//! 请求经过认证拦截器发送，`Authorization` 由拦截器注入；
//! 这里只负责检查本地凭据是否齐全和解析响应。

use crate::crm::config::{endpoints, ClientConfig};
use crate::crm::contacts::types::{
    AccessTokenReq, ContactsListResp, ErrorBody, GoogleContact, ImportContactResp, ImportStatus,
};
use crate::crm::error::ContactsError;
use crate::crm::session::SessionCoordinator;
use crate::crm::token::{AuthClient, TokenStore};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

/// 联系人 API 客户端
pub struct ContactsApi {
    config: ClientConfig,
    client: AuthClient,
    tokens: TokenStore,
}

impl ContactsApi {
    /// `client` 应该来自已安装的认证拦截器
    pub fn new(config: ClientConfig, client: AuthClient, tokens: TokenStore) -> Self {
        Self {
            config,
            client,
            tokens,
        }
    }

    /// 复用协调器的配置、拦截器和 token 存储
    pub fn from_coordinator(coordinator: &SessionCoordinator) -> Self {
        Self::new(
            coordinator.config().clone(),
            coordinator.interceptor().client(),
            coordinator.tokens().clone(),
        )
    }

    fn require_identity(&self) -> Result<(), ContactsError> {
        match self.tokens.identity_token() {
            Some(_) => Ok(()),
            None => {
                warn!("[Contacts] ⚠️ 未登录，拒绝访问联系人");
                Err(ContactsError::Unauthenticated)
            }
        }
    }

    fn require_access_token(&self) -> Result<String, ContactsError> {
        self.require_identity()?;
        self.tokens.delegated_token().ok_or_else(|| {
            warn!("[Contacts] ⚠️ 缺少委托 token，需要重新进行 Google 授权");
            ContactsError::MissingAccessToken
        })
    }

    /// 列出 Google 联系人和分组（不导入）
    pub async fn list_contacts(&self) -> Result<ContactsListResp, ContactsError> {
        let access_token = self.require_access_token()?;
        let url = self.config.url(endpoints::CONTACTS_LIST);
        info!("[Contacts] 📡 请求联系人列表");

        let response = self
            .client
            .post(&url)
            .json(&AccessTokenReq {
                access_token: &access_token,
            })
            .send()
            .await
            .map_err(|e| ContactsError::Request(e.to_string()))?;
        let resp: ContactsListResp = read_response(response, "联系人列表").await?;
        info!(
            "[Contacts] ✅ 获取到 {} 个联系人，{} 个分组",
            resp.contacts.len(),
            resp.groups.len()
        );
        Ok(resp)
    }

    /// 从 Google 拉取联系人
    pub async fn sync_contacts(&self) -> Result<Vec<GoogleContact>, ContactsError> {
        let access_token = self.require_access_token()?;
        let url = self.config.url(endpoints::CONTACTS_SYNC);
        info!("[Contacts] 📡 请求同步联系人");

        let response = self
            .client
            .post(&url)
            .json(&AccessTokenReq {
                access_token: &access_token,
            })
            .send()
            .await
            .map_err(|e| ContactsError::Request(e.to_string()))?;
        read_response(response, "同步联系人").await
    }

    /// 把一个 Google 联系人导入 CRM
    pub async fn import_contact(
        &self,
        contact: &GoogleContact,
    ) -> Result<ImportContactResp, ContactsError> {
        self.require_identity()?;
        let url = self.config.url(endpoints::CONTACTS_IMPORT);
        info!(
            "[Contacts] 📡 导入联系人: {}",
            contact.resource_name.as_deref().unwrap_or("-")
        );

        let response = self
            .client
            .post(&url)
            .json(contact)
            .send()
            .await
            .map_err(|e| ContactsError::Request(e.to_string()))?;
        read_response(response, "导入联系人").await
    }

    /// 查询联系人是否已导入，任何失败都视为未导入
    pub async fn check_import_status(&self, resource_name: &str) -> ImportStatus {
        match self.try_check_import_status(resource_name).await {
            Ok(status) => status,
            Err(e) => {
                warn!("[Contacts] 查询导入状态失败，按未导入处理: {}", e);
                ImportStatus::default()
            }
        }
    }

    async fn try_check_import_status(
        &self,
        resource_name: &str,
    ) -> Result<ImportStatus, ContactsError> {
        self.require_identity()?;
        let url = format!(
            "{}/{}",
            self.config.url(endpoints::CONTACTS_CHECK_IMPORT),
            urlencoding::encode(resource_name)
        );
        debug!("[Contacts] 查询导入状态: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ContactsError::Request(e.to_string()))?;
        read_response(response, "导入状态").await
    }
}

/// 非 2xx 响应映射为 [`ContactsError`]，否则反序列化 body
async fn read_response<T: DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<T, ContactsError> {
    let status = response.status();
    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| ContactsError::Request(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&body_bytes)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            });
        error!(
            "[Contacts] {}请求失败，HTTP状态: {}, 错误: {}",
            operation_name, status, message
        );
        return Err(match status {
            StatusCode::UNAUTHORIZED => ContactsError::Unauthenticated,
            StatusCode::FORBIDDEN => ContactsError::PermissionDenied,
            _ => ContactsError::Http {
                status: status.as_u16(),
                message,
            },
        });
    }

    serde_json::from_slice(&body_bytes).map_err(|e| {
        error!("[Contacts] {}响应反序列化失败: {:?}", operation_name, e);
        ContactsError::Request(format!("invalid response: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::token::RequestInterceptor;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer, signed_in: bool, delegated: bool) -> ContactsApi {
        let tokens = TokenStore::new();
        if signed_in {
            tokens.set_identity_token("idtok1");
            tokens.set_user_id("u1");
        }
        if delegated {
            tokens.set_delegated_token("ya29.token");
        }
        let interceptor = RequestInterceptor::new(reqwest::Client::new(), tokens.clone());
        ContactsApi::new(ClientConfig::new(server.uri()), interceptor.install(), tokens)
    }

    #[tokio::test]
    async fn list_contacts_sends_delegated_token_with_injected_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoints::CONTACTS_LIST))
            .and(header("Authorization", "Bearer idtok1"))
            .and(body_json(json!({"access_token": "ya29.token"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "contacts": [{"resource_name": "people/c1", "names": "Grace"}],
                "groups": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = api(&server, true, true).list_contacts().await.unwrap();
        assert_eq!(resp.contacts.len(), 1);
        assert_eq!(resp.contacts[0].resource_name.as_deref(), Some("people/c1"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let server = MockServer::start().await;

        let err = api(&server, false, false).list_contacts().await.unwrap_err();
        assert_eq!(err, ContactsError::Unauthenticated);
        assert_eq!(err.to_string(), "Please sign in to access contacts");

        let err = api(&server, true, false).sync_contacts().await.unwrap_err();
        assert_eq!(err, ContactsError::MissingAccessToken);
        assert_eq!(err.to_string(), "Google authentication required");

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_errors_map_to_contacts_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoints::CONTACTS_SYNC))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "quota"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(endpoints::CONTACTS_LIST))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "denied"})))
            .mount(&server)
            .await;

        let api = api(&server, true, true);
        assert_eq!(
            api.sync_contacts().await.unwrap_err(),
            ContactsError::Http {
                status: 500,
                message: "quota".into()
            }
        );
        assert_eq!(
            api.list_contacts().await.unwrap_err(),
            ContactsError::PermissionDenied
        );
    }

    #[tokio::test]
    async fn import_posts_contact_body() {
        let server = MockServer::start().await;
        let contact = GoogleContact {
            resource_name: Some("people/c1".into()),
            names: "Grace".into(),
            email_addresses: vec!["grace@example.com".into()],
            ..Default::default()
        };
        Mock::given(method("POST"))
            .and(path(endpoints::CONTACTS_IMPORT))
            .and(body_json(serde_json::to_value(&contact).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Contact imported successfully",
                "person": {"id": 7, "name": "Grace", "email": "grace@example.com"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = api(&server, true, false).import_contact(&contact).await.unwrap();
        assert_eq!(resp.person.map(|p| p.id), Some(7));
    }

    #[tokio::test]
    async fn check_import_encodes_resource_name_and_fails_gracefully() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contacts/check-import/people%2Fc1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "imported": true,
                "person": {"id": 7, "name": "Grace"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/contacts/check-import/people%2Fc2"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "db down"})))
            .mount(&server)
            .await;

        let api = api(&server, true, false);
        assert!(api.check_import_status("people/c1").await.imported);
        assert_eq!(api.check_import_status("people/c2").await, ImportStatus::default());
    }
}
