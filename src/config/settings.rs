// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含服务器、数据库、Redis、准入节流、任务队列、凭证、去重、上游、关闭和指标等配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 数据库配置
    pub database: DatabaseSettings,
    /// Redis配置
    #[serde(default)]
    pub redis: RedisSettings,
    /// 准入节流配置
    pub rate_limiting: RateLimitingSettings,
    /// 任务队列配置
    pub queue: QueueSettings,
    /// 凭证配置
    pub credentials: CredentialSettings,
    /// 去重配置
    pub dedup: DedupSettings,
    /// 上游数据源配置
    pub upstream: UpstreamSettings,
    /// 关闭配置
    pub shutdown: ShutdownSettings,
    /// 指标配置
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// Redis配置设置
///
/// 设置了URL时使用基于Redis的准入闸门，支持多进程部署
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisSettings {
    pub url: Option<String>,
}

/// 准入节流配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitingSettings {
    /// 同一搜索词两次准入之间的冷却时间（秒）
    pub cooldown_secs: u64,
}

/// 任务队列配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// 最大尝试次数
    pub max_retries: i32,
    /// 单次尝试超时（秒）
    pub attempt_timeout_secs: u64,
    /// 工作器数量
    pub worker_concurrency: usize,
    /// 队列为空时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 任务租约时长（秒），须长于一次任务处理的最坏耗时
    pub lease_secs: i64,
    /// 初始退避（毫秒）
    pub backoff_initial_ms: u64,
    /// 最大退避（秒）
    pub backoff_max_secs: u64,
    /// 资源耗尽时的固定重排延迟（秒）
    pub exhausted_delay_secs: u64,
}

/// 凭证配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSettings {
    /// 后台刷新周期（秒）
    pub refresh_interval_secs: u64,
    /// Cron 刷新表达式，设置后替代固定周期
    pub refresh_cron: Option<String>,
    /// 单次刷新超时（秒）
    pub refresh_timeout_secs: u64,
    /// 静态令牌，设置后不启动浏览器
    pub static_token: Option<String>,
    /// 登录页URL
    pub login_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// 令牌在 localStorage 中的键
    pub token_storage_key: String,
    /// 远程 Chrome 调试地址
    pub chromium_remote_url: Option<String>,
}

/// 去重配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DedupSettings {
    /// 最短搜索词长度（字符数）
    pub min_term_length: usize,
    /// 黑名单，为空时使用内置列表
    pub denylist: Vec<String>,
}

/// 上游数据源配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    /// API 根地址
    pub base_url: String,
    /// 每页条数
    pub page_size: u32,
    /// 最多翻页数
    pub max_pages: u32,
    /// 结果总数上限，超过视为搜索词过于宽泛
    pub result_ceiling: u64,
    /// 每分钟请求数上限
    pub requests_per_minute: u32,
    /// 同时进行的上游请求上限
    pub max_in_flight: usize,
    /// 单个HTTP请求超时（秒）
    pub request_timeout_secs: u64,
}

/// 关闭配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    /// 优雅关闭宽限期（秒）
    pub grace_period_secs: u64,
}

/// 指标配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    /// Prometheus 监听地址，未设置时不启动导出器
    pub listen_addr: Option<String>,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和
    /// `PROPSCOUT__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("PROPSCOUT").separator("__"))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// 仅由默认值构成的配置
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::with_defaults()?
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// 校验配置项之间的约束
    ///
    /// 一次任务处理最多包含两次凭证刷新和两次抓取尝试（凭证失效后的立即重试），
    /// 租约必须覆盖这段时间，否则队列维护会把仍在执行的任务交给其他工作器。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let worst_case = 2 * (self.queue.attempt_timeout_secs + self.credentials.refresh_timeout_secs);
        if self.queue.lease_secs <= 0 || (self.queue.lease_secs as u64) <= worst_case {
            return Err(ConfigError::Message(format!(
                "queue.lease_secs ({}) must exceed 2 * (queue.attempt_timeout_secs + credentials.refresh_timeout_secs) = {}",
                self.queue.lease_secs, worst_case
            )));
        }
        Ok(())
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite://propscout.db?mode=rwc")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("rate_limiting.cooldown_secs", 300)?
            .set_default("queue.max_retries", 3)?
            .set_default("queue.attempt_timeout_secs", 120)?
            .set_default("queue.worker_concurrency", 4)?
            .set_default("queue.poll_interval_ms", 1000)?
            .set_default("queue.lease_secs", 600)?
            .set_default("queue.backoff_initial_ms", 2000)?
            .set_default("queue.backoff_max_secs", 60)?
            .set_default("queue.exhausted_delay_secs", 5)?
            .set_default("credentials.refresh_interval_secs", 270)?
            .set_default("credentials.refresh_timeout_secs", 60)?
            .set_default("credentials.username_selector", "input[name=username]")?
            .set_default("credentials.password_selector", "input[name=password]")?
            .set_default("credentials.submit_selector", "button[type=submit]")?
            .set_default("credentials.token_storage_key", "access_token")?
            .set_default("dedup.min_term_length", 4)?
            .set_default("dedup.denylist", Vec::<String>::new())?
            .set_default("upstream.base_url", "http://localhost:8080/api")?
            .set_default("upstream.page_size", 100)?
            .set_default("upstream.max_pages", 50)?
            .set_default("upstream.result_ceiling", 5000)?
            .set_default("upstream.requests_per_minute", 60)?
            .set_default("upstream.max_in_flight", 8)?
            .set_default("upstream.request_timeout_secs", 30)?
            .set_default("shutdown.grace_period_secs", 30)
    }
}

impl QueueSettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_secs)
    }

    pub fn exhausted_delay(&self) -> Duration {
        Duration::from_secs(self.exhausted_delay_secs)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
