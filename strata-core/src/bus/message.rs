//! Bus message types: tagged request/response unions and their payloads.

use serde::Serialize;

use crate::error::{Result, StrataError};

/// Well-known bus recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerId {
    /// Storage coordinator
    Storage,
    /// Volatile in-memory tier
    Ram,
    /// Durable disk tier
    Disk,
    /// Socket front-end
    Socket,
}

/// The bare tag of a request, used to index handler registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Set,
    GetKey,
    GetGroup,
    DeleteKey,
    DeleteGroup,
    List,
}

/// SET request body.
#[derive(Debug, Clone)]
pub struct SetRequest {
    pub id: String,
    /// Selects the disk tier; its negation selects the memory tier.
    pub persistent: bool,
    /// TTL in seconds; values <= 0 mean no expiration.
    pub ttl: i64,
    pub key: String,
    pub value: String,
    pub group: String,
}

/// Request body for the per-key operations (GET KEY, DELETE KEY).
#[derive(Debug, Clone)]
pub struct KeyRequest {
    pub id: String,
    pub key: String,
}

/// Request body for the per-group operations (GET GROUP, DELETE GROUP).
#[derive(Debug, Clone)]
pub struct GroupRequest {
    pub id: String,
    pub group: String,
}

/// LIST request body.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub id: String,
}

/// Tagged request union dispatched over the bus.
#[derive(Debug, Clone)]
pub enum StorageRequest {
    Set(SetRequest),
    GetKey(KeyRequest),
    GetGroup(GroupRequest),
    DeleteKey(KeyRequest),
    DeleteGroup(GroupRequest),
    List(ListRequest),
}

impl StorageRequest {
    /// The registration tag of this request.
    pub fn kind(&self) -> RequestKind {
        match self {
            StorageRequest::Set(_) => RequestKind::Set,
            StorageRequest::GetKey(_) => RequestKind::GetKey,
            StorageRequest::GetGroup(_) => RequestKind::GetGroup,
            StorageRequest::DeleteKey(_) => RequestKind::DeleteKey,
            StorageRequest::DeleteGroup(_) => RequestKind::DeleteGroup,
            StorageRequest::List(_) => RequestKind::List,
        }
    }

    /// The envelope id carried by this request.
    pub fn id(&self) -> &str {
        match self {
            StorageRequest::Set(m) => &m.id,
            StorageRequest::GetKey(m) | StorageRequest::DeleteKey(m) => &m.id,
            StorageRequest::GetGroup(m) | StorageRequest::DeleteGroup(m) => &m.id,
            StorageRequest::List(m) => &m.id,
        }
    }

    pub fn into_set(self) -> Result<SetRequest> {
        match self {
            StorageRequest::Set(m) => Ok(m),
            other => Err(request_mismatch("Set", &other)),
        }
    }

    pub fn into_get_key(self) -> Result<KeyRequest> {
        match self {
            StorageRequest::GetKey(m) => Ok(m),
            other => Err(request_mismatch("GetKey", &other)),
        }
    }

    pub fn into_get_group(self) -> Result<GroupRequest> {
        match self {
            StorageRequest::GetGroup(m) => Ok(m),
            other => Err(request_mismatch("GetGroup", &other)),
        }
    }

    pub fn into_delete_key(self) -> Result<KeyRequest> {
        match self {
            StorageRequest::DeleteKey(m) => Ok(m),
            other => Err(request_mismatch("DeleteKey", &other)),
        }
    }

    pub fn into_delete_group(self) -> Result<GroupRequest> {
        match self {
            StorageRequest::DeleteGroup(m) => Ok(m),
            other => Err(request_mismatch("DeleteGroup", &other)),
        }
    }

    pub fn into_list(self) -> Result<ListRequest> {
        match self {
            StorageRequest::List(m) => Ok(m),
            other => Err(request_mismatch("List", &other)),
        }
    }
}

fn request_mismatch(expected: &str, got: &StorageRequest) -> StrataError {
    StrataError::internal(format!(
        "request type mismatch: expected {expected}, got {:?}",
        got.kind()
    ))
}

/// A key/value pair as returned by group queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// A full entry as returned by LIST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEntry {
    pub key: String,
    pub value: String,
    pub group: String,
}

/// SET response body.
#[derive(Debug, Clone)]
pub struct SetResponse {
    pub id: String,
    pub ok: bool,
}

/// GET KEY response body; `value` is empty when the key is absent.
#[derive(Debug, Clone)]
pub struct GetKeyResponse {
    pub id: String,
    pub value: String,
}

/// GET GROUP response body.
#[derive(Debug, Clone)]
pub struct GetGroupResponse {
    pub id: String,
    pub entries: Vec<KeyValue>,
}

/// Response body for DELETE KEY and DELETE GROUP: the number of removed
/// records.
#[derive(Debug, Clone)]
pub struct DeleteResponse {
    pub id: String,
    pub count: u64,
}

/// LIST response body.
#[derive(Debug, Clone)]
pub struct ListResponse {
    pub id: String,
    pub entries: Vec<StorageEntry>,
}

/// Tagged response union returned over the bus.
#[derive(Debug, Clone)]
pub enum StorageResponse {
    Set(SetResponse),
    GetKey(GetKeyResponse),
    GetGroup(GetGroupResponse),
    DeleteKey(DeleteResponse),
    DeleteGroup(DeleteResponse),
    List(ListResponse),
}

impl StorageResponse {
    fn kind_name(&self) -> &'static str {
        match self {
            StorageResponse::Set(_) => "Set",
            StorageResponse::GetKey(_) => "GetKey",
            StorageResponse::GetGroup(_) => "GetGroup",
            StorageResponse::DeleteKey(_) => "DeleteKey",
            StorageResponse::DeleteGroup(_) => "DeleteGroup",
            StorageResponse::List(_) => "List",
        }
    }

    pub fn into_set(self) -> Result<SetResponse> {
        match self {
            StorageResponse::Set(r) => Ok(r),
            other => Err(response_mismatch("Set", &other)),
        }
    }

    pub fn into_get_key(self) -> Result<GetKeyResponse> {
        match self {
            StorageResponse::GetKey(r) => Ok(r),
            other => Err(response_mismatch("GetKey", &other)),
        }
    }

    pub fn into_get_group(self) -> Result<GetGroupResponse> {
        match self {
            StorageResponse::GetGroup(r) => Ok(r),
            other => Err(response_mismatch("GetGroup", &other)),
        }
    }

    pub fn into_delete_key(self) -> Result<DeleteResponse> {
        match self {
            StorageResponse::DeleteKey(r) => Ok(r),
            other => Err(response_mismatch("DeleteKey", &other)),
        }
    }

    pub fn into_delete_group(self) -> Result<DeleteResponse> {
        match self {
            StorageResponse::DeleteGroup(r) => Ok(r),
            other => Err(response_mismatch("DeleteGroup", &other)),
        }
    }

    pub fn into_list(self) -> Result<ListResponse> {
        match self {
            StorageResponse::List(r) => Ok(r),
            other => Err(response_mismatch("List", &other)),
        }
    }
}

fn response_mismatch(expected: &str, got: &StorageResponse) -> StrataError {
    StrataError::internal(format!(
        "response type mismatch: expected {expected}, got {}",
        got.kind_name()
    ))
}
