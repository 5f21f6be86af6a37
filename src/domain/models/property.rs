// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 房产记录
///
/// 上游搜索结果中的一行。原始负载完整保留在 `raw` 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// 上游记录ID
    pub external_id: String,
    /// 业主姓名
    pub owner_name: Option<String>,
    /// 地址
    pub address: Option<String>,
    /// 地块编号
    pub parcel_id: Option<String>,
    /// 原始JSON
    pub raw: Value,
}

impl PropertyRecord {
    /// 从上游结果行构建记录
    ///
    /// 缺少 `id` 字段的行返回 `None`。`id` 可以是字符串或数字。
    pub fn from_upstream(row: Value) -> Option<Self> {
        let external_id = match row.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let text = |key: &str| {
            row.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            external_id,
            owner_name: text("owner_name"),
            address: text("address"),
            parcel_id: text("parcel_id"),
            raw: row,
        })
    }
}
