//! 认证拦截器
//!
//! 所有出站请求都经过同一个 [`AuthClient`]：调用方没有设置 `Authorization`
//! 时，在发送前注入 `Bearer <当前身份 token>`。token 在发送时从
//! [`TokenStore`] 读取，而不是在安装时捕获，所以重复安装不会叠加包装层。

use crate::crm::token::store::TokenStore;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, RequestBuilder, Response};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 带认证注入的 HTTP 客户端
#[derive(Clone, Debug)]
pub struct AuthClient {
    inner: reqwest::Client,
    tokens: TokenStore,
}

impl AuthClient {
    pub fn request(&self, method: Method, url: &str) -> AuthRequestBuilder {
        AuthRequestBuilder {
            client: self.clone(),
            builder: self.inner.request(method, url),
        }
    }

    pub fn get(&self, url: &str) -> AuthRequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> AuthRequestBuilder {
        self.request(Method::POST, url)
    }

    /// 在请求上补充认证头，返回是否注入
    ///
    /// 已有 `Authorization` 的请求保持原样，请求体、方法和其他头都不改动。
    pub fn authorize(&self, request: &mut Request) -> bool {
        if request.headers().contains_key(AUTHORIZATION) {
            return false;
        }
        let Some(token) = self.tokens.identity_token() else {
            return false;
        };
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
                true
            }
            Err(e) => {
                warn!("[Interceptor] ⚠️ 身份 token 不是合法的请求头值，跳过注入: {}", e);
                false
            }
        }
    }

    /// 注入认证头后发送
    pub async fn execute(&self, mut request: Request) -> reqwest::Result<Response> {
        let injected = self.authorize(&mut request);
        debug!(
            "[Interceptor] {} {} (注入认证头: {})",
            request.method(),
            request.url(),
            injected
        );
        self.inner.execute(request).await
    }
}

/// [`AuthClient`] 创建的请求构建器
///
/// 只暴露经过拦截器的发送路径，`send()` 总会先补充认证头。
#[derive(Debug)]
pub struct AuthRequestBuilder {
    client: AuthClient,
    builder: RequestBuilder,
}

impl AuthRequestBuilder {
    fn map(self, f: impl FnOnce(RequestBuilder) -> RequestBuilder) -> Self {
        Self {
            builder: f(self.builder),
            client: self.client,
        }
    }

    pub fn header<K: AsRef<str>, V: AsRef<str>>(self, key: K, value: V) -> Self {
        self.map(|b| b.header(key.as_ref(), value.as_ref()))
    }

    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Self {
        self.map(|b| b.json(body))
    }

    pub fn body(self, body: impl Into<reqwest::Body>) -> Self {
        self.map(|b| b.body(body))
    }

    pub fn query<T: Serialize + ?Sized>(self, query: &T) -> Self {
        self.map(|b| b.query(query))
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.map(|b| b.timeout(timeout))
    }

    /// 构建请求（不注入认证头，发送时再注入）
    pub fn build(self) -> reqwest::Result<Request> {
        self.builder.build()
    }

    pub async fn send(self) -> reqwest::Result<Response> {
        let request = self.builder.build()?;
        self.client.execute(request).await
    }
}

/// 拦截器：每个进程只包装一次原始客户端
#[derive(Debug)]
pub struct RequestInterceptor {
    base: reqwest::Client,
    tokens: TokenStore,
    layer: OnceLock<AuthClient>,
    installed: AtomicBool,
    install_calls: AtomicUsize,
}

impl RequestInterceptor {
    /// `base` 为未包装的原始客户端
    pub fn new(base: reqwest::Client, tokens: TokenStore) -> Self {
        Self {
            base,
            tokens,
            layer: OnceLock::new(),
            installed: AtomicBool::new(false),
            install_calls: AtomicUsize::new(0),
        }
    }

    /// 安装拦截器（幂等），返回唯一的包装客户端
    pub fn install(&self) -> AuthClient {
        let calls = self.install_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let client = self.client();
        if !self.installed.swap(true, Ordering::SeqCst) {
            info!("[Interceptor] ✅ 认证拦截器已安装");
        } else {
            debug!("[Interceptor] 拦截器已存在，复用（第 {} 次安装调用）", calls);
        }
        client
    }

    /// 获取包装客户端，不改变安装状态
    pub fn client(&self) -> AuthClient {
        self.layer
            .get_or_init(|| AuthClient {
                inner: self.base.clone(),
                tokens: self.tokens.clone(),
            })
            .clone()
    }

    /// 登录后是否已经安装过
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// 包装层数，只可能是 0 或 1
    pub fn layers(&self) -> usize {
        usize::from(self.layer.get().is_some())
    }

    pub fn install_calls(&self) -> usize {
        self.install_calls.load(Ordering::SeqCst)
    }
}
