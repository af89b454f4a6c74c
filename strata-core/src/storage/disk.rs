//! # Disk Tier - 持久存储层实现
//!
//! 基于 SQLite 的持久层。单连接置于写锁之下，处理器内的数据库操作通过
//! `spawn_blocking` 执行，避免阻塞 worker。

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::bus::message::{
    DeleteResponse, GetGroupResponse, GetKeyResponse, HandlerId, KeyValue, ListResponse,
    RequestKind, SetResponse, StorageEntry, StorageRequest, StorageResponse,
};
use crate::bus::MessageBus;
use crate::error::{Result, StrataError};

/// 持久存储层
///
/// 单表 `store(key TEXT PRIMARY KEY, value TEXT, group_name TEXT)`，
/// 持久性由 SQLite 的事务保证，没有 TTL。
pub struct DiskTier {
    conn: Arc<Mutex<Connection>>,
}

impl DiskTier {
    /// 打开（或创建）数据库
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| StrataError::Storage(format!("failed to open database: {e}")))?;

        // 配置 WAL 模式
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| StrataError::Storage(format!("failed to configure WAL: {e}")))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS store (
                key TEXT PRIMARY KEY,
                value TEXT,
                group_name TEXT
            )",
            [],
        )
        .map_err(|e| StrataError::Storage(format!("failed to create store table: {e}")))?;

        info!(path = %path.display(), "disk tier opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 事务性写入；失败时事务守卫在 drop 中回滚
    pub fn put(&self, key: &str, value: &str, group: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| StrataError::Storage(format!("failed to begin transaction: {e}")))?;
        tx.execute(
            "INSERT OR REPLACE INTO store (key, value, group_name) VALUES (?1, ?2, ?3)",
            params![key, value, group],
        )
        .map_err(|e| StrataError::Storage(format!("put failed: {e}")))?;
        tx.commit()
            .map_err(|e| StrataError::Storage(format!("commit failed: {e}")))?;
        debug!(key = %key, "stored key");
        Ok(())
    }

    /// 读取一个键；不存在时返回空串
    pub fn get(&self, key: &str) -> Result<String> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT value FROM store WHERE key = ?1")
            .map_err(|e| StrataError::Storage(format!("prepare failed: {e}")))?;
        let value = stmt
            .query_row(params![key], |row| row.get::<_, String>(0))
            .optional()
            .map_err(|e| StrataError::Storage(format!("get failed: {e}")))?;
        Ok(value.unwrap_or_default())
    }

    /// 返回指定组的全部键值对
    pub fn get_group(&self, group: &str) -> Result<Vec<KeyValue>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key, value FROM store WHERE group_name = ?1")
            .map_err(|e| StrataError::Storage(format!("prepare failed: {e}")))?;
        let rows = stmt
            .query_map(params![group], |row| {
                Ok(KeyValue {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            })
            .map_err(|e| StrataError::Storage(format!("group query failed: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| StrataError::Storage(format!("read row failed: {e}")))?);
        }
        Ok(entries)
    }

    /// 删除一个键；删除了行返回 1，否则 0
    pub fn delete(&self, key: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let changes = conn
            .execute("DELETE FROM store WHERE key = ?1", params![key])
            .map_err(|e| StrataError::Storage(format!("delete failed: {e}")))?;
        debug!(key = %key, removed = changes, "delete key");
        Ok(changes as u64)
    }

    /// 删除指定组的全部行，返回删除行数
    pub fn delete_group(&self, group: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let changes = conn
            .execute("DELETE FROM store WHERE group_name = ?1", params![group])
            .map_err(|e| StrataError::Storage(format!("delete group failed: {e}")))?;
        debug!(group = %group, removed = changes, "delete group");
        Ok(changes as u64)
    }

    /// 返回全部行
    pub fn list(&self) -> Result<Vec<StorageEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key, value, group_name FROM store")
            .map_err(|e| StrataError::Storage(format!("prepare failed: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StorageEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    group: row.get(2)?,
                })
            })
            .map_err(|e| StrataError::Storage(format!("list query failed: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| StrataError::Storage(format!("read row failed: {e}")))?);
        }
        Ok(entries)
    }

    /// 在总线上订阅六个存储操作
    ///
    /// 每个处理器把数据库访问移入 `spawn_blocking`，连接锁只在阻塞闭包
    /// 内部持有。
    pub fn register(self: &Arc<Self>, bus: &MessageBus) -> Result<()> {
        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Disk, RequestKind::Set, move |req: StorageRequest| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_set()?;
                let id = msg.id.clone();
                run_blocking(move || tier.put(&msg.key, &msg.value, &msg.group)).await?;
                Ok(Some(StorageResponse::Set(SetResponse { id, ok: true })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Disk, RequestKind::GetKey, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_get_key()?;
                let id = msg.id.clone();
                let value = run_blocking(move || tier.get(&msg.key)).await?;
                Ok(Some(StorageResponse::GetKey(GetKeyResponse { id, value })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Disk, RequestKind::GetGroup, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_get_group()?;
                let id = msg.id.clone();
                let entries = run_blocking(move || tier.get_group(&msg.group)).await?;
                Ok(Some(StorageResponse::GetGroup(GetGroupResponse {
                    id,
                    entries,
                })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Disk, RequestKind::DeleteKey, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_delete_key()?;
                let id = msg.id.clone();
                let count = run_blocking(move || tier.delete(&msg.key)).await?;
                Ok(Some(StorageResponse::DeleteKey(DeleteResponse {
                    id,
                    count,
                })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Disk, RequestKind::DeleteGroup, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_delete_group()?;
                let id = msg.id.clone();
                let count = run_blocking(move || tier.delete_group(&msg.group)).await?;
                Ok(Some(StorageResponse::DeleteGroup(DeleteResponse {
                    id,
                    count,
                })))
            }
        })?;

        let tier = Arc::clone(self);
        bus.subscribe(HandlerId::Disk, RequestKind::List, move |req| {
            let tier = Arc::clone(&tier);
            async move {
                let msg = req.into_list()?;
                let entries = run_blocking(move || tier.list()).await?;
                Ok(Some(StorageResponse::List(ListResponse {
                    id: msg.id,
                    entries,
                })))
            }
        })?;

        Ok(())
    }
}

/// 在阻塞线程池上执行数据库操作
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StrataError::Storage(format!("blocking task failed: {e}")))?
}
