//! # RAM Tier Implementation
//!
//! 线程安全的易失性存储层，带 TTL 和按字节预算的淘汰机制。
//!
//! ## 特性
//!
//! - 基于 HashMap + 有序淘汰索引 (BTreeMap) 的高效实现
//! - 按插入时间 FIFO 淘汰，键到索引项的句柄稳定
//! - TTL (Time To Live) 支持，过期由后台 reaper 统一清理
//! - 增量维护的字节用量计数，插入与删除严格对称
//! - 淘汰/过期统计 (原子计数器)
//!
//! ## 不变量
//!
//! - 每条记录在淘汰索引中恰有一项，反之亦然
//! - 用量计数等于所有存活记录成本之和
//! - 每轮 reaper 结束后，用量不超过上限或索引为空

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::bus::message::{
    DeleteResponse, GetGroupResponse, GetKeyResponse, HandlerId, KeyValue, ListResponse,
    RequestKind, SetResponse, StorageEntry, StorageRequest, StorageResponse,
};
use crate::bus::MessageBus;
use crate::error::Result;

/// 每条记录的固定簿记开销（字节），计入成本函数
pub const ENTRY_OVERHEAD_BYTES: usize = 64;

/// reaper 的默认唤醒间隔
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// 淘汰索引中的稳定句柄：插入时间 + 单调序号（打破同刻插入的平局）
type EvictionKey = (Instant, u64);

/// RAM 中的一条记录
struct RamEntry {
    value: String,
    group: String,
    /// `None` 表示永不过期 (ttl <= 0)
    expires_at: Option<Instant>,
    /// 插入时计算并存储的成本；删除时减去同一数值
    cost: usize,
    /// 指向淘汰索引的句柄
    eviction_key: EvictionKey,
}

/// RAM 层内部状态，整体处于单一写锁之下
#[derive(Default)]
struct RamState {
    entries: HashMap<String, RamEntry>,
    /// 淘汰索引：插入时间升序，最老的记录排在最前
    eviction_index: BTreeMap<EvictionKey, String>,
    /// 当前字节用量（增量维护）
    usage: usize,
    /// 淘汰句柄的平局序号
    seq: u64,
}

impl RamState {
    /// 删除一条记录，精确回退插入时的全部簿记
    fn remove_record(&mut self, key: &str) -> Option<RamEntry> {
        let entry = self.entries.remove(key)?;
        self.eviction_index.remove(&entry.eviction_key);
        self.usage -= entry.cost;
        Some(entry)
    }
}

/// 淘汰/过期统计
#[derive(Debug, Default)]
pub struct RamMetrics {
    expirations: AtomicU64,
    evictions: AtomicU64,
}

impl RamMetrics {
    fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// 过期清理次数
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// 容量淘汰次数
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// 统计快照
#[derive(Debug, Clone, serde::Serialize)]
pub struct RamMetricsSnapshot {
    pub entries: usize,
    pub usage_bytes: usize,
    pub max_bytes: usize,
    pub expirations: u64,
    pub evictions: u64,
}

/// 易失性存储层
///
/// 六个操作全部持有同一把写锁，层内读写构成全序。过期清理与容量淘汰由
/// 后台 reaper 执行，读路径不做 TTL 检查。
pub struct RamTier {
    state: Mutex<RamState>,
    max_bytes: usize,
    sweep_interval: Duration,
    metrics: RamMetrics,
    shutdown_tx: watch::Sender<bool>,
}

impl RamTier {
    /// 创建 RAM 层，容量上限以 MB 计
    pub fn new(max_size_mb: usize) -> Self {
        Self::with_options(max_size_mb * 1024 * 1024, DEFAULT_SWEEP_INTERVAL)
    }

    /// 创建带字节级上限与自定义清理间隔的 RAM 层
    pub fn with_options(max_bytes: usize, sweep_interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        info!(max_bytes = max_bytes, "ram tier initialized");
        Self {
            state: Mutex::new(RamState::default()),
            max_bytes,
            sweep_interval,
            metrics: RamMetrics::default(),
            shutdown_tx,
        }
    }

    /// 单条记录的成本：键、值、组的字节长度加固定开销
    fn entry_cost(key: &str, value: &str, group: &str) -> usize {
        key.len() + value.len() + group.len() + ENTRY_OVERHEAD_BYTES
    }

    /// 写入或覆盖一个键
    pub fn put(&self, key: &str, value: &str, group: &str, ttl_seconds: i64) {
        let mut state = self.state.lock();
        let now = Instant::now();

        // 覆盖写：旧记录先完整退场，保证用量计数精确
        if state.remove_record(key).is_some() {
            debug!(key = %key, "overwriting existing key");
        }

        let cost = Self::entry_cost(key, value, group);
        let seq = state.seq;
        state.seq += 1;
        let eviction_key = (now, seq);
        state.eviction_index.insert(eviction_key, key.to_string());

        let expires_at = if ttl_seconds > 0 {
            Some(now + Duration::from_secs(ttl_seconds as u64))
        } else {
            None
        };

        state.entries.insert(
            key.to_string(),
            RamEntry {
                value: value.to_string(),
                group: group.to_string(),
                expires_at,
                cost,
                eviction_key,
            },
        );
        state.usage += cost;
        trace!(key = %key, usage = state.usage, "stored key");
    }

    /// 读取一个键；不存在时返回空串
    ///
    /// 读路径不检查 TTL：已过期但尚未被 reaper 清理的记录仍会返回。
    pub fn get(&self, key: &str) -> String {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
            .unwrap_or_default()
    }

    /// 返回指定组的全部键值对（线性扫描，顺序不保证）
    pub fn get_group(&self, group: &str) -> Vec<KeyValue> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .filter(|(_, entry)| entry.group == group)
            .map(|(key, entry)| KeyValue {
                key: key.clone(),
                value: entry.value.clone(),
            })
            .collect()
    }

    /// 删除一个键；删除了记录返回 1，否则 0
    pub fn delete(&self, key: &str) -> u64 {
        let mut state = self.state.lock();
        if state.remove_record(key).is_some() {
            debug!(key = %key, "deleted key");
            1
        } else {
            0
        }
    }

    /// 删除指定组的全部记录，返回删除条数
    pub fn delete_group(&self, group: &str) -> u64 {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.group == group)
            .map(|(key, _)| key.clone())
            .collect();

        let count = keys.len() as u64;
        for key in keys {
            state.remove_record(&key);
        }
        debug!(group = %group, count = count, "deleted group");
        count
    }

    /// 返回全部存活记录（顺序不保证）
    pub fn list(&self) -> Vec<StorageEntry> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .map(|(key, entry)| StorageEntry {
                key: key.clone(),
                value: entry.value.clone(),
                group: entry.group.clone(),
            })
            .collect()
    }

    /// 当前字节用量
    pub fn usage(&self) -> usize {
        self.state.lock().usage
    }

    /// 当前记录数
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// 统计快照
    pub fn metrics(&self) -> RamMetricsSnapshot {
        let state = self.state.lock();
        RamMetricsSnapshot {
            entries: state.entries.len(),
            usage_bytes: state.usage,
            max_bytes: self.max_bytes,
            expirations: self.metrics.expirations(),
            evictions: self.metrics.evictions(),
        }
    }

    /// 执行一轮维护：先 TTL 清理，再容量淘汰
    ///
    /// 一轮结束后，用量不超过上限或淘汰索引为空。
    pub fn sweep(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();

        // --- 1. TTL 清理 ---
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at.is_some_and(|at| at <= now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            state.remove_record(&key);
            self.metrics.record_expiration();
            debug!(key = %key, "removed expired entry");
        }

        // --- 2. 容量淘汰（FIFO，最老的先走）---
        while state.usage > self.max_bytes {
            let Some((eviction_key, key)) = state
                .eviction_index
                .iter()
                .next()
                .map(|(handle, key)| (*handle, key.clone()))
            else {
                break;
            };

            if state.entries.contains_key(&key) {
                state.remove_record(&key);
                self.metrics.record_eviction();
                debug!(key = %key, usage = state.usage, "evicted oldest entry");
            } else {
                // 索引项没有对应记录：单独移除索引项
                state.eviction_index.remove(&eviction_key);
            }
        }
    }

    /// 启动后台 reaper
    ///
    /// 每个清理间隔或停机信号唤醒一次，先到者生效。reaper 与各操作处理器
    /// 竞争同一把层锁。
    pub fn start_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let tier = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(tier.sweep_interval);
            // interval 的首个 tick 立即完成
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = timer.tick() => tier.sweep(),
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("ram reaper stopped");
        })
    }

    /// 通知 reaper 停止
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// 在总线上订阅六个存储操作
    pub fn register(self: &Arc<Self>, bus: &MessageBus) -> Result<()> {
        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Ram, RequestKind::Set, move |req: StorageRequest| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_set()?;
                tier.put(&msg.key, &msg.value, &msg.group, msg.ttl);
                Ok(Some(StorageResponse::Set(SetResponse {
                    id: msg.id,
                    ok: true,
                })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Ram, RequestKind::GetKey, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_get_key()?;
                let value = tier.get(&msg.key);
                Ok(Some(StorageResponse::GetKey(GetKeyResponse {
                    id: msg.id,
                    value,
                })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Ram, RequestKind::GetGroup, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_get_group()?;
                let entries = tier.get_group(&msg.group);
                Ok(Some(StorageResponse::GetGroup(GetGroupResponse {
                    id: msg.id,
                    entries,
                })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Ram, RequestKind::DeleteKey, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_delete_key()?;
                let count = tier.delete(&msg.key);
                Ok(Some(StorageResponse::DeleteKey(DeleteResponse {
                    id: msg.id,
                    count,
                })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Ram, RequestKind::DeleteGroup, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_delete_group()?;
                let count = tier.delete_group(&msg.group);
                Ok(Some(StorageResponse::DeleteGroup(DeleteResponse {
                    id: msg.id,
                    count,
                })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Ram, RequestKind::List, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_list()?;
                let entries = tier.list();
                Ok(Some(StorageResponse::List(ListResponse {
                    id: msg.id,
                    entries,
                })))
            }
        })?;

        Ok(())
    }

    /// 审计内部状态：(记录数, 索引项数, 用量, 重算用量)
    #[cfg(test)]
    fn audit(&self) -> (usize, usize, usize, usize) {
        let state = self.state.lock();
        let recomputed: usize = state.entries.values().map(|entry| entry.cost).sum();
        (
            state.entries.len(),
            state.eviction_index.len(),
            state.usage,
            recomputed,
        )
    }
}
