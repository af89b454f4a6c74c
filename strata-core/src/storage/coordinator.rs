//! # Storage Coordinator
//!
//! The policy layer in front of the two tiers. It validates incoming
//! requests, routes writes by the `persistent` flag, cascades point reads
//! memory-first, and fans group/delete/list operations out to both tiers
//! before merging the results.
//!
//! Consistency contract:
//!
//! | Operation    | Authoritative tier(s)                        |
//! |--------------|----------------------------------------------|
//! | SET          | exactly one, chosen by `persistent`          |
//! | GET KEY      | memory first, disk as fallback               |
//! | GET GROUP    | both, memory entries first                   |
//! | DELETE KEY   | both, counts summed (0, 1 or 2)              |
//! | DELETE GROUP | both, counts summed                          |
//! | LIST         | both, memory entries first                   |
//!
//! A read satisfied by the disk tier does not populate the memory tier.

use std::sync::Arc;

use tracing::debug;

use crate::bus::dispatch::BusResult;
use crate::bus::message::{
    DeleteResponse, GetGroupResponse, GroupRequest, HandlerId, KeyRequest, ListRequest,
    ListResponse, RequestKind, SetRequest, StorageRequest, StorageResponse,
};
use crate::bus::MessageBus;
use crate::error::{Result, StrataError};

/// Routes storage requests across the memory and disk tiers.
pub struct StorageCoordinator {
    bus: Arc<MessageBus>,
}

impl StorageCoordinator {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }

    /// Subscribe the six storage operations on the bus.
    pub fn register(self: &Arc<Self>) -> Result<()> {
        let coordinator = Arc::clone(self);
        self.bus
            .subscribe(HandlerId::Storage, RequestKind::Set, move |req| {
                let coordinator = Arc::clone(&coordinator);
                async move { Ok(Some(coordinator.handle_set(req.into_set()?).await?)) }
            })?;

        let coordinator = Arc::clone(self);
        self.bus
            .subscribe(HandlerId::Storage, RequestKind::GetKey, move |req| {
                let coordinator = Arc::clone(&coordinator);
                async move { Ok(Some(coordinator.handle_get_key(req.into_get_key()?).await?)) }
            })?;

        let coordinator = Arc::clone(self);
        self.bus
            .subscribe(HandlerId::Storage, RequestKind::GetGroup, move |req| {
                let coordinator = Arc::clone(&coordinator);
                async move {
                    Ok(Some(
                        coordinator.handle_get_group(req.into_get_group()?).await?,
                    ))
                }
            })?;

        let coordinator = Arc::clone(self);
        self.bus
            .subscribe(HandlerId::Storage, RequestKind::DeleteKey, move |req| {
                let coordinator = Arc::clone(&coordinator);
                async move {
                    Ok(Some(
                        coordinator
                            .handle_delete_key(req.into_delete_key()?)
                            .await?,
                    ))
                }
            })?;

        let coordinator = Arc::clone(self);
        self.bus
            .subscribe(HandlerId::Storage, RequestKind::DeleteGroup, move |req| {
                let coordinator = Arc::clone(&coordinator);
                async move {
                    Ok(Some(
                        coordinator
                            .handle_delete_group(req.into_delete_group()?)
                            .await?,
                    ))
                }
            })?;

        let coordinator = Arc::clone(self);
        self.bus
            .subscribe(HandlerId::Storage, RequestKind::List, move |req| {
                let coordinator = Arc::clone(&coordinator);
                async move { Ok(Some(coordinator.handle_list(req.into_list()?).await?)) }
            })?;

        Ok(())
    }

    /// SET: exactly one tier, chosen by the `persistent` flag.
    async fn handle_set(&self, msg: SetRequest) -> Result<StorageResponse> {
        if msg.key.is_empty() || msg.value.is_empty() {
            return Err(StrataError::invalid_input(
                "key and value must be non-empty",
            ));
        }

        let target = if msg.persistent {
            HandlerId::Disk
        } else {
            HandlerId::Ram
        };
        debug!(key = %msg.key, target = ?target, "routing SET");
        self.bus.request(target, StorageRequest::Set(msg)).await
    }

    /// GET KEY: memory first; an empty value falls through to disk.
    async fn handle_get_key(&self, msg: KeyRequest) -> Result<StorageResponse> {
        if msg.key.is_empty() {
            return Err(StrataError::invalid_input("key must be non-empty"));
        }

        let ram = self
            .bus
            .request(HandlerId::Ram, StorageRequest::GetKey(msg.clone()))
            .await?
            .into_get_key()?;
        if !ram.value.is_empty() {
            debug!(key = %msg.key, "key served from ram tier");
            return Ok(StorageResponse::GetKey(ram));
        }

        debug!(key = %msg.key, "key not in ram tier, querying disk");
        self.bus
            .request(HandlerId::Disk, StorageRequest::GetKey(msg))
            .await
    }

    /// GET GROUP: both tiers in parallel, memory entries first.
    async fn handle_get_group(&self, msg: GroupRequest) -> Result<StorageResponse> {
        if msg.group.is_empty() {
            return Err(StrataError::invalid_input("group must be non-empty"));
        }

        // both dispatches are enqueued before either result is awaited
        let ram_pending = self
            .bus
            .send(HandlerId::Ram, StorageRequest::GetGroup(msg.clone()))?;
        let disk_pending = self
            .bus
            .send(HandlerId::Disk, StorageRequest::GetGroup(msg.clone()))?;

        let ram = await_response(ram_pending).await?.into_get_group()?;
        let disk = await_response(disk_pending).await?.into_get_group()?;

        let mut entries = ram.entries;
        entries.extend(disk.entries);
        debug!(group = %msg.group, total = entries.len(), "merged group query");
        Ok(StorageResponse::GetGroup(GetGroupResponse {
            id: msg.id,
            entries,
        }))
    }

    /// DELETE KEY: both tiers in parallel, counts summed (0, 1 or 2).
    async fn handle_delete_key(&self, msg: KeyRequest) -> Result<StorageResponse> {
        if msg.key.is_empty() {
            return Err(StrataError::invalid_input("key must be non-empty"));
        }

        let ram_pending = self
            .bus
            .send(HandlerId::Ram, StorageRequest::DeleteKey(msg.clone()))?;
        let disk_pending = self
            .bus
            .send(HandlerId::Disk, StorageRequest::DeleteKey(msg.clone()))?;

        let ram = await_response(ram_pending).await?.into_delete_key()?;
        let disk = await_response(disk_pending).await?.into_delete_key()?;

        Ok(StorageResponse::DeleteKey(DeleteResponse {
            id: msg.id,
            count: ram.count + disk.count,
        }))
    }

    /// DELETE GROUP: both tiers in parallel, counts summed.
    async fn handle_delete_group(&self, msg: GroupRequest) -> Result<StorageResponse> {
        if msg.group.is_empty() {
            return Err(StrataError::invalid_input("group must be non-empty"));
        }

        let ram_pending = self
            .bus
            .send(HandlerId::Ram, StorageRequest::DeleteGroup(msg.clone()))?;
        let disk_pending = self
            .bus
            .send(HandlerId::Disk, StorageRequest::DeleteGroup(msg.clone()))?;

        let ram = await_response(ram_pending).await?.into_delete_group()?;
        let disk = await_response(disk_pending).await?.into_delete_group()?;

        debug!(
            group = %msg.group,
            ram = ram.count,
            disk = disk.count,
            "deleted group across tiers"
        );
        Ok(StorageResponse::DeleteGroup(DeleteResponse {
            id: msg.id,
            count: ram.count + disk.count,
        }))
    }

    /// LIST: both tiers in parallel, memory entries first.
    async fn handle_list(&self, msg: ListRequest) -> Result<StorageResponse> {
        let ram_pending = self
            .bus
            .send(HandlerId::Ram, StorageRequest::List(msg.clone()))?;
        let disk_pending = self
            .bus
            .send(HandlerId::Disk, StorageRequest::List(msg.clone()))?;

        let ram = await_response(ram_pending).await?.into_list()?;
        let disk = await_response(disk_pending).await?.into_list()?;

        let mut entries = ram.entries;
        entries.extend(disk.entries);
        Ok(StorageResponse::List(ListResponse {
            id: msg.id,
            entries,
        }))
    }
}

/// Await a tier response, treating a missing one as an internal error.
async fn await_response(pending: BusResult) -> Result<StorageResponse> {
    pending
        .wait()
        .await?
        .ok_or_else(|| StrataError::internal("tier handler returned no response"))
}
