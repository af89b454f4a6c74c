//! # 工作池消息总线实现
//!
//! 基于 tokio 的 [`MessageBus`] 实现，使用固定大小的 worker 池执行处理器。
//!
//! ## 设计特点
//!
//! - **立即返回**: `send` 在请求入队后立即返回 [`BusResult`]，调用方自行决定
//!   何时等待
//! - **读写分离**: 订阅/退订持有处理器表的写锁，分发只持有读锁；处理器运行
//!   期间不持有任何表锁
//! - **嵌套分发**: 处理器内部可以继续在同一总线上 `send`，worker 数量（默认
//!   20）大于协调器的最大扇出深度（2），嵌套等待不会自锁
//! - **优雅停机**: `shutdown` 拒绝新请求、排空在途任务并回收全部 worker

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::message::{HandlerId, RequestKind, StorageRequest, StorageResponse};
use crate::error::{Result, StrataError};

/// worker 池的默认大小
pub const DEFAULT_WORKER_COUNT: usize = 20;

/// 处理器返回的 boxed future
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Option<StorageResponse>>> + Send>>;

/// 按 `(接收者, 请求类型)` 注册的处理器
pub type HandlerFn = Arc<dyn Fn(StorageRequest) -> HandlerFuture + Send + Sync>;

/// worker 池中的一项待执行任务
struct Job {
    handler: HandlerFn,
    request: StorageRequest,
    reply: oneshot::Sender<Result<Option<StorageResponse>>>,
}

/// 在途分发的结果句柄
///
/// `send` 返回后请求已经入队；调用 [`BusResult::wait`] 获取处理器的结果。
#[derive(Debug)]
pub struct BusResult {
    rx: oneshot::Receiver<Result<Option<StorageResponse>>>,
}

impl BusResult {
    /// 等待处理器完成
    pub async fn wait(self) -> Result<Option<StorageResponse>> {
        match self.rx.await {
            Ok(result) => result,
            // worker 在回复前消失，只会发生在停机期间
            Err(_) => Err(StrataError::ShuttingDown),
        }
    }
}

/// 工作池消息总线
///
/// 必须在 tokio 运行时内创建；构造时启动全部 worker 任务。
pub struct MessageBus {
    /// `(接收者, 请求类型)` -> 处理器
    handlers: RwLock<HashMap<(HandlerId, RequestKind), HandlerFn>>,
    /// 任务队列发送端；停机时置空以关闭通道
    queue: RwLock<Option<mpsc::UnboundedSender<Job>>>,
    /// 停机标志
    shutting_down: AtomicBool,
    /// worker 任务句柄
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageBus {
    /// 创建带默认 worker 数量的总线
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_WORKER_COUNT)
    }

    /// 创建带指定 worker 数量的总线
    pub fn with_workers(count: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(count);
        for worker_id in 0..count {
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(async move {
                loop {
                    // 取任务时短暂持有接收端锁，执行处理器前已释放
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };

                    trace!(
                        worker = worker_id,
                        kind = ?job.request.kind(),
                        "worker picked up request"
                    );
                    let result = (job.handler)(job.request).await;
                    if job.reply.send(result).is_err() {
                        trace!(worker = worker_id, "caller dropped before reply");
                    }
                }
                trace!(worker = worker_id, "worker exiting");
            }));
        }

        Self {
            handlers: RwLock::new(HashMap::new()),
            queue: RwLock::new(Some(tx)),
            shutting_down: AtomicBool::new(false),
            workers: Mutex::new(workers),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    /// 订阅处理器
    ///
    /// 同一 `(recipient, kind)` 只允许注册一个处理器，重复注册返回
    /// [`StrataError::HandlerAlreadyRegistered`]。
    pub fn subscribe<F, Fut>(
        &self,
        recipient: HandlerId,
        kind: RequestKind,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(StorageRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<StorageResponse>>> + Send + 'static,
    {
        let mut handlers = self.handlers.write();
        match handlers.entry((recipient, kind)) {
            Entry::Occupied(_) => Err(StrataError::HandlerAlreadyRegistered(format!(
                "{recipient:?}/{kind:?}"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(move |req| Box::pin(handler(req)) as HandlerFuture));
                debug!(recipient = ?recipient, kind = ?kind, "handler subscribed");
                Ok(())
            }
        }
    }

    /// 退订处理器，返回是否存在过
    pub fn unsubscribe(&self, recipient: HandlerId, kind: RequestKind) -> bool {
        let removed = self.handlers.write().remove(&(recipient, kind)).is_some();
        if removed {
            debug!(recipient = ?recipient, kind = ?kind, "handler unsubscribed");
        }
        removed
    }

    /// 当前注册的处理器数量
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// 分发请求
    ///
    /// 请求入队后立即返回 [`BusResult`]；处理器在 worker 池中执行。
    pub fn send(&self, recipient: HandlerId, request: StorageRequest) -> Result<BusResult> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(StrataError::ShuttingDown);
        }

        let kind = request.kind();
        let handler = self
            .handlers
            .read()
            .get(&(recipient, kind))
            .cloned()
            .ok_or_else(|| StrataError::HandlerNotFound(format!("{recipient:?}/{kind:?}")))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            handler,
            request,
            reply: reply_tx,
        };

        let queue = self.queue.read();
        let Some(tx) = queue.as_ref() else {
            return Err(StrataError::ShuttingDown);
        };
        tx.send(job).map_err(|_| StrataError::ShuttingDown)?;

        trace!(recipient = ?recipient, kind = ?kind, "request enqueued");
        Ok(BusResult { rx: reply_rx })
    }

    /// 分发并等待响应
    ///
    /// 处理器未返回响应时报内部错误；这是协调器和前端使用的便捷形式。
    pub async fn request(
        &self,
        recipient: HandlerId,
        request: StorageRequest,
    ) -> Result<StorageResponse> {
        let kind = request.kind();
        let pending = self.send(recipient, request)?;
        pending.wait().await?.ok_or_else(|| {
            StrataError::internal(format!(
                "handler for {recipient:?}/{kind:?} returned no response"
            ))
        })
    }

    /// 优雅停机
    ///
    /// 置位停机标志（此后 `send` 返回 [`StrataError::ShuttingDown`]），关闭
    /// 任务队列，排空已入队与在途的任务，回收全部 worker，清空处理器表。
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.queue.write().take();

        let workers = {
            let mut guard = self.workers.lock().await;
            std::mem::take(&mut *guard)
        };
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("bus worker panicked during shutdown: {e}");
            }
        }

        self.handlers.write().clear();
        debug!("message bus shutdown complete");
    }
}
