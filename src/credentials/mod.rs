// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 凭证模块
///
/// - 凭证代理（broker）：持有当前凭证，单飞刷新与后台定时刷新
/// - 凭证提供者（provider）：凭证获取接口与静态实现
/// - 浏览器提供者（browser_provider）：基于无头Chromium的登录获取
pub mod broker;
pub mod browser_provider;
pub mod provider;
