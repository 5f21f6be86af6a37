// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::CredentialSettings;
use crate::credentials::provider::CredentialProvider;
use crate::domain::models::credential::{Credential, CredentialError};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::ops::Deref;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 浏览器登录配置
#[derive(Debug, Clone)]
pub struct BrowserLoginConfig {
    /// 登录页URL
    pub login_url: String,
    pub username: String,
    pub password: String,
    /// 用户名输入框选择器
    pub username_selector: String,
    /// 密码输入框选择器
    pub password_selector: String,
    /// 提交按钮选择器
    pub submit_selector: String,
    /// 登录后保存令牌的 localStorage 键（同名 Cookie 作为后备）
    pub token_storage_key: String,
    /// 远程 Chrome 调试地址，未设置时本地启动
    pub remote_url: Option<String>,
    /// 轮询令牌的间隔
    pub poll_interval: Duration,
    /// 轮询次数上限
    pub max_polls: u32,
}

impl BrowserLoginConfig {
    /// 从配置构建
    ///
    /// 登录URL、用户名和密码缺一不可
    pub fn from_settings(settings: &CredentialSettings) -> Result<Self, CredentialError> {
        let required = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| CredentialError::Configuration(format!("credentials.{} is required", name)))
        };

        Ok(Self {
            login_url: required(&settings.login_url, "login_url")?,
            username: required(&settings.username, "username")?,
            password: required(&settings.password, "password")?,
            username_selector: settings.username_selector.clone(),
            password_selector: settings.password_selector.clone(),
            submit_selector: settings.submit_selector.clone(),
            token_storage_key: settings.token_storage_key.clone(),
            remote_url: settings.chromium_remote_url.clone(),
            poll_interval: Duration::from_millis(500),
            max_polls: 40,
        })
    }
}

fn browser_error(context: &str) -> impl Fn(chromiumoxide::error::CdpError) -> CredentialError + '_ {
    move |e| CredentialError::Browser(format!("{}: {}", context, e))
}

/// 需要异步释放的外部资源
pub(crate) trait Release: Send + 'static {
    /// 释放资源
    fn release(self) -> BoxFuture<'static, ()>;
}

/// 资源守卫
///
/// 显式 `release` 时等待释放完成；未释放就被丢弃时（例如外层超时取消了
/// future）把释放交给后台任务执行。
pub(crate) struct ReleaseGuard<R: Release> {
    resource: Option<R>,
}

impl<R: Release> ReleaseGuard<R> {
    pub(crate) fn new(resource: R) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    pub(crate) async fn release(mut self) {
        if let Some(resource) = self.resource.take() {
            resource.release().await;
        }
    }
}

impl<R: Release> Deref for ReleaseGuard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        // only `release` and `drop` take the resource, both consume the guard
        self.resource
            .as_ref()
            .unwrap_or_else(|| unreachable!("resource taken before guard was consumed"))
    }
}

impl<R: Release> Drop for ReleaseGuard<R> {
    fn drop(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(resource.release());
            }
            Err(_) => debug!("No runtime to release resource on drop"),
        }
    }
}

/// 浏览器会话
///
/// 持有浏览器实例和事件处理任务。释放时先关闭本地启动的浏览器，再中止事件任务。
struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    owned: bool,
}

impl BrowserSession {
    async fn open(config: &BrowserLoginConfig) -> Result<ReleaseGuard<Self>, CredentialError> {
        let (browser, mut handler, owned) = if let Some(url) = &config.remote_url {
            debug!(url = %url, "Connecting to remote Chrome instance");
            let (browser, handler) = Browser::connect(url)
                .await
                .map_err(browser_error("failed to connect to remote Chrome"))?;
            (browser, handler, false)
        } else {
            let browser_config = BrowserConfig::builder()
                .no_sandbox()
                .request_timeout(Duration::from_secs(30))
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .build()
                .map_err(CredentialError::Browser)?;
            let (browser, handler) = Browser::launch(browser_config)
                .await
                .map_err(browser_error("failed to launch Chrome"))?;
            (browser, handler, true)
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(ReleaseGuard::new(Self {
            browser,
            handler_task,
            owned,
        }))
    }

    async fn new_page(&self) -> Result<ReleaseGuard<Page>, CredentialError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_error("failed to open page"))?;
        Ok(ReleaseGuard::new(page))
    }
}

impl Release for BrowserSession {
    fn release(mut self) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if self.owned {
                if let Err(e) = self.browser.close().await {
                    debug!(error = %e, "Browser close failed");
                }
                if let Err(e) = self.browser.wait().await {
                    debug!(error = %e, "Browser process wait failed");
                }
            }
            self.handler_task.abort();
        })
    }
}

impl Release for Page {
    fn release(self) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = self.close().await {
                debug!(error = %e, "Page close failed");
            }
        })
    }
}

/// 读取令牌的页面脚本
pub(crate) fn token_lookup_script(storage_key: &str) -> String {
    // serde_json produces a valid JS string literal
    let key = serde_json::to_string(storage_key).unwrap_or_else(|_| "\"\"".to_string());
    format!("window.localStorage.getItem({})", key)
}

/// 浏览器凭证提供者
///
/// 驱动无头 Chromium 完成登录：打开登录页，填写用户名和密码，提交后
/// 轮询 localStorage 或 Cookie 获取令牌。
pub struct BrowserCredentialProvider {
    config: BrowserLoginConfig,
}

impl BrowserCredentialProvider {
    pub fn new(config: BrowserLoginConfig) -> Self {
        Self { config }
    }

    async fn login(&self, session: &BrowserSession) -> Result<Credential, CredentialError> {
        let page = session.new_page().await?;
        let result = self.login_on_page(&page).await;
        page.release().await;
        result
    }

    async fn login_on_page(&self, page: &Page) -> Result<Credential, CredentialError> {
        page.goto(&self.config.login_url)
            .await
            .map_err(browser_error("navigation to login page failed"))?;

        page.find_element(&self.config.username_selector)
            .await
            .map_err(browser_error("username field not found"))?
            .click()
            .await
            .map_err(browser_error("username field not clickable"))?
            .type_str(&self.config.username)
            .await
            .map_err(browser_error("typing username failed"))?;

        page.find_element(&self.config.password_selector)
            .await
            .map_err(browser_error("password field not found"))?
            .click()
            .await
            .map_err(browser_error("password field not clickable"))?
            .type_str(&self.config.password)
            .await
            .map_err(browser_error("typing password failed"))?;

        page.find_element(&self.config.submit_selector)
            .await
            .map_err(browser_error("submit button not found"))?
            .click()
            .await
            .map_err(browser_error("submit failed"))?;

        let script = token_lookup_script(&self.config.token_storage_key);
        for poll in 0..self.config.max_polls {
            if let Some(token) = self.read_token(page, &script).await {
                debug!(polls = poll + 1, "Token found after login");
                return Ok(Credential::new(token));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        Err(CredentialError::Provider(format!(
            "no token under '{}' after login",
            self.config.token_storage_key
        )))
    }

    async fn read_token(&self, page: &Page, script: &str) -> Option<String> {
        match page.evaluate(script).await {
            Ok(result) => {
                if let Ok(Some(token)) = result.into_value::<Option<String>>() {
                    if !token.is_empty() {
                        return Some(token);
                    }
                }
            }
            Err(e) => debug!(error = %e, "localStorage lookup failed"),
        }

        match page.get_cookies().await {
            Ok(cookies) => cookies
                .into_iter()
                .find(|c| c.name == self.config.token_storage_key && !c.value.is_empty())
                .map(|c| c.value),
            Err(e) => {
                debug!(error = %e, "Cookie lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for BrowserCredentialProvider {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        info!(login_url = %self.config.login_url, "Acquiring credential through browser login");
        let session = BrowserSession::open(&self.config).await?;
        let result = self.login(&session).await;
        session.release().await;
        if let Err(e) = &result {
            warn!(error = %e, "Browser login failed");
        }
        result
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
