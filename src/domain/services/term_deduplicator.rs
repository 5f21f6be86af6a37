// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::term::SearchTerm;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::debug;

/// 默认最短搜索词长度
pub const DEFAULT_MIN_TERM_LENGTH: usize = 4;

/// 内置高频词黑名单（街道后缀等）
pub const DEFAULT_DENYLIST: &[&str] = &[
    "street", "st", "avenue", "ave", "road", "rd", "drive", "dr", "lane", "ln", "court", "ct",
    "circle", "boulevard", "blvd", "place", "way", "trail", "parkway", "highway", "terrace",
    "north", "south", "east", "west", "unknown", "owner", "the",
];

/// 企业实体后缀
static ENTITY_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "llc",
        "inc",
        "trust",
        "estate",
        "corp",
        "co",
        "ltd",
        "lp",
        "llp",
        "company",
        "partnership",
        "holdings",
        "properties",
    ]
    .into_iter()
    .collect()
});

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// 太短
    TooShort,
    /// 命中黑名单
    TooCommon,
    /// 已使用过
    AlreadyUsed,
    /// 已用词加企业后缀
    BusinessSuperset,
    /// 两个词都已使用
    TwoWordSuperset,
    /// 三个及以上的词都已使用
    MultiWordSuperset,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TooShort => "too_short",
            SkipReason::TooCommon => "too_common",
            SkipReason::AlreadyUsed => "already_used",
            SkipReason::BusinessSuperset => "business_superset",
            SkipReason::TwoWordSuperset => "two_word_superset",
            SkipReason::MultiWordSuperset => "multi_word_superset",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 去重配置
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// 最短长度（字符数）
    pub min_term_length: usize,
    /// 黑名单，统一小写存储
    pub denylist: HashSet<String>,
}

impl DedupConfig {
    /// 从配置值构建，黑名单为空时使用内置列表
    pub fn new(min_term_length: usize, denylist: &[String]) -> Self {
        let denylist = if denylist.is_empty() {
            DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect()
        } else {
            denylist.iter().map(|s| s.trim().to_lowercase()).collect()
        };
        Self {
            min_term_length,
            denylist,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_TERM_LENGTH, &[])
    }
}

/// 去重统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub accepted: u64,
    pub too_short: u64,
    pub too_common: u64,
    pub already_used: u64,
    pub business_superset: u64,
    pub two_word_superset: u64,
    pub multi_word_superset: u64,
    /// 已使用搜索词数量
    pub used_terms: usize,
    /// 被上游拒绝、建议加入黑名单的搜索词
    pub denylist_candidates: Vec<String>,
}

impl DedupStats {
    fn bump(&mut self, reason: Option<SkipReason>) {
        let counter = match reason {
            None => &mut self.accepted,
            Some(SkipReason::TooShort) => &mut self.too_short,
            Some(SkipReason::TooCommon) => &mut self.too_common,
            Some(SkipReason::AlreadyUsed) => &mut self.already_used,
            Some(SkipReason::BusinessSuperset) => &mut self.business_superset,
            Some(SkipReason::TwoWordSuperset) => &mut self.two_word_superset,
            Some(SkipReason::MultiWordSuperset) => &mut self.multi_word_superset,
        };
        *counter += 1;
    }
}

/// 搜索词去重器
///
/// 纯内存的保留/跳过判定引擎，不做任何I/O。规则按顺序匹配，首个命中生效：
///
/// 1. 字符数小于最短长度
/// 2. 命中黑名单（不区分大小写）
/// 3. 与已使用词完全相同
/// 4. 两个词且第二个是企业后缀，第一个已使用
/// 5. 两个词且都已使用
/// 6. 三个及以上的词且全部已使用
///
/// 已使用集合只增不减。检查与标记之间的并发由调用方串行化。
#[derive(Debug)]
pub struct TermDeduplicator {
    config: DedupConfig,
    used: HashSet<SearchTerm>,
    stats: DedupStats,
    denylist_candidates: BTreeSet<String>,
}

impl TermDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            used: HashSet::new(),
            stats: DedupStats::default(),
            denylist_candidates: BTreeSet::new(),
        }
    }

    /// 判定搜索词是否应跳过，并累加对应计数
    ///
    /// # 返回值
    ///
    /// * `Some(SkipReason)` - 应跳过及原因
    /// * `None` - 接受
    pub fn check(&mut self, term: &SearchTerm) -> Option<SkipReason> {
        let reason = self.evaluate(term);
        self.stats.bump(reason);
        if let Some(reason) = reason {
            debug!(term = %term, reason = %reason, "Search term skipped");
            metrics::counter!("dedup_skipped_total", "reason" => reason.as_str()).increment(1);
        }
        reason
    }

    /// 判定搜索词是否应跳过
    pub fn should_skip(&mut self, term: &SearchTerm) -> bool {
        self.check(term).is_some()
    }

    fn evaluate(&self, term: &SearchTerm) -> Option<SkipReason> {
        if term.char_len() < self.config.min_term_length {
            return Some(SkipReason::TooShort);
        }

        if self.config.denylist.contains(&term.as_str().to_lowercase()) {
            return Some(SkipReason::TooCommon);
        }

        if self.used.contains(term) {
            return Some(SkipReason::AlreadyUsed);
        }

        let tokens: Vec<&str> = term.tokens().collect();
        match tokens.as_slice() {
            [base, suffix] => {
                if is_entity_suffix(suffix) && self.is_used_token(base) {
                    Some(SkipReason::BusinessSuperset)
                } else if self.is_used_token(base) && self.is_used_token(suffix) {
                    Some(SkipReason::TwoWordSuperset)
                } else {
                    None
                }
            }
            many if many.len() >= 3 => many
                .iter()
                .all(|t| self.is_used_token(t))
                .then_some(SkipReason::MultiWordSuperset),
            _ => None,
        }
    }

    fn is_used_token(&self, token: &str) -> bool {
        self.used.contains(&SearchTerm::new(token))
    }

    /// 标记搜索词已使用
    ///
    /// 幂等。返回是否为新加入的词。
    pub fn mark_used(&mut self, term: SearchTerm) -> bool {
        self.used.insert(term)
    }

    /// 批量加入已使用集合，不计入统计
    pub fn seed<I>(&mut self, terms: I) -> usize
    where
        I: IntoIterator<Item = SearchTerm>,
    {
        terms
            .into_iter()
            .filter(|t| !t.is_empty())
            .map(|t| self.used.insert(t))
            .filter(|inserted| *inserted)
            .count()
    }

    pub fn is_used(&self, term: &SearchTerm) -> bool {
        self.used.contains(term)
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// 记录被上游拒绝的搜索词，只作为黑名单候选，不自动生效
    pub fn add_denylist_candidate(&mut self, term: &SearchTerm) {
        self.denylist_candidates.insert(term.as_str().to_lowercase());
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            used_terms: self.used.len(),
            denylist_candidates: self.denylist_candidates.iter().cloned().collect(),
            ..self.stats.clone()
        }
    }
}

impl Default for TermDeduplicator {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

fn is_entity_suffix(token: &str) -> bool {
    let normalized = token.trim_end_matches('.').to_lowercase();
    ENTITY_SUFFIXES.contains(normalized.as_str())
}

/// 上游拒绝反馈
///
/// 工作器在上游判定搜索词无效时回报，由持有去重器的一方记录。
#[async_trait]
pub trait RejectionSink: Send + Sync {
    async fn report_rejection(&self, term: &SearchTerm, reason: &str);
}
