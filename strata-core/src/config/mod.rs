//! # Configuration
//!
//! 服务配置模块。配置来自单个 JSON 文件：
//!
//! ```json
//! {
//!     "ram": { "maxSizeMB": 10 },
//!     "disk": { "dbFile": "strata.db" },
//!     "socket": { "socketPath": "/tmp/strata.sock" }
//! }
//! ```
//!
//! 任何字段缺失都是致命的启动错误；相对路径按进程工作目录解析为绝对路径。

use std::path::PathBuf;

use serde::Deserialize;

mod loader;

pub use loader::ConfigLoader;

/// 顶层配置
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ram: RamConfig,
    pub disk: DiskConfig,
    pub socket: SocketConfig,
}

/// RAM 层配置
#[derive(Debug, Clone, Deserialize)]
pub struct RamConfig {
    /// 内存层容量上限 (MB)
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: usize,
}

/// 磁盘层配置
#[derive(Debug, Clone, Deserialize)]
pub struct DiskConfig {
    /// SQLite 数据库文件路径
    #[serde(rename = "dbFile")]
    pub db_file: PathBuf,
}

/// socket 配置
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    /// Unix socket 路径
    #[serde(rename = "socketPath")]
    pub socket_path: PathBuf,
}
