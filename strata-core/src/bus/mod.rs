//! # 消息总线模块
//!
//! 实现 strata 系统的请求/响应分发机制。
//!
//! ## 设计原则
//!
//! - **无全局状态**: 每个总线实例独立，禁止全局单例
//! - **显式路由**: 每个请求有明确的接收者 ([`HandlerId`]) 和请求类型 ([`RequestKind`])
//! - **标签化消息**: 请求和响应是封闭的标签联合体，注册与分发都按标签索引，
//!   从根本上消除运行时类型不匹配
//! - **有界工作池**: 固定数量的 worker 执行所有处理器，调用方在入队后立即
//!   获得 future
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use strata_core::bus::{MessageBus, HandlerId, RequestKind};
//! use strata_core::bus::message::{StorageRequest, StorageResponse, KeyRequest, GetKeyResponse};
//!
//! # async fn example() -> strata_core::Result<()> {
//! let bus = MessageBus::new();
//!
//! // 订阅处理器
//! bus.subscribe(HandlerId::Ram, RequestKind::GetKey, |req: StorageRequest| async move {
//!     let msg = req.into_get_key()?;
//!     Ok(Some(StorageResponse::GetKey(GetKeyResponse {
//!         id: msg.id,
//!         value: String::new(),
//!     })))
//! })?;
//!
//! // 发送请求并等待响应
//! let req = StorageRequest::GetKey(KeyRequest { id: "r1".into(), key: "k".into() });
//! let resp = bus.request(HandlerId::Ram, req).await?;
//! assert!(resp.into_get_key().is_ok());
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod message;

pub use dispatch::{BusResult, MessageBus, DEFAULT_WORKER_COUNT};
pub use message::{HandlerId, RequestKind, StorageRequest, StorageResponse};
