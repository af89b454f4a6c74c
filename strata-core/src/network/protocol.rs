//! Wire protocol: decoding request envelopes and encoding response frames.
//!
//! Requests are single JSON objects. The `event` field selects the
//! operation; the remaining body fields depend on it:
//!
//! ```json
//! {"id":"a","event":"SET","flags":{"persistent":true,"ttl":3600},
//!  "key":"k","value":"v","group":"g"}
//! {"id":"b","event":"GET KEY","key":"k"}
//! {"id":"c","event":"LIST"}
//! ```
//!
//! Responses carry the echoed `id` plus a `response` field whose shape
//! depends on the operation. Failures of any kind are reported as
//! `{"error":"<message>"}` without an `id`.

use serde::Deserialize;
use serde_json::json;

use crate::bus::message::{
    GroupRequest, KeyRequest, ListRequest, SetRequest, StorageRequest, StorageResponse,
};
use crate::error::{Result, StrataError};

/// Incoming request envelope, one JSON object per line.
#[derive(Debug, Deserialize)]
struct RequestFrame {
    /// Echoed back in the response; absent means empty.
    #[serde(default)]
    id: String,
    event: String,
    flags: Option<SetFlags>,
    key: Option<String>,
    value: Option<String>,
    group: Option<String>,
}

/// SET-specific flags.
#[derive(Debug, Deserialize)]
struct SetFlags {
    persistent: bool,
    ttl: i64,
}

/// Decode one wire line into a bus request.
pub fn decode_request(line: &str) -> Result<StorageRequest> {
    let frame: RequestFrame = serde_json::from_str(line)?;
    let RequestFrame {
        id,
        event,
        flags,
        key,
        value,
        group,
    } = frame;

    match event.as_str() {
        "SET" => {
            let flags = flags.ok_or_else(|| StrataError::invalid_input("missing field `flags`"))?;
            Ok(StorageRequest::Set(SetRequest {
                id,
                persistent: flags.persistent,
                ttl: flags.ttl,
                key: require(key, "key")?,
                value: require(value, "value")?,
                group: require(group, "group")?,
            }))
        }
        "GET KEY" => Ok(StorageRequest::GetKey(KeyRequest {
            id,
            key: require(key, "key")?,
        })),
        "GET GROUP" => Ok(StorageRequest::GetGroup(GroupRequest {
            id,
            group: require(group, "group")?,
        })),
        "DELETE KEY" => Ok(StorageRequest::DeleteKey(KeyRequest {
            id,
            key: require(key, "key")?,
        })),
        "DELETE GROUP" => Ok(StorageRequest::DeleteGroup(GroupRequest {
            id,
            group: require(group, "group")?,
        })),
        "LIST" => Ok(StorageRequest::List(ListRequest { id })),
        other => Err(StrataError::UnknownEvent(other.to_string())),
    }
}

fn require(field: Option<String>, name: &str) -> Result<String> {
    field.ok_or_else(|| StrataError::invalid_input(format!("missing field `{name}`")))
}

/// Serialize a response as one JSON frame (without the trailing newline).
pub fn encode_response(response: &StorageResponse) -> String {
    let frame = match response {
        StorageResponse::Set(r) => json!({ "id": r.id, "response": r.ok }),
        StorageResponse::GetKey(r) => json!({ "id": r.id, "response": r.value }),
        StorageResponse::GetGroup(r) => json!({ "id": r.id, "response": r.entries }),
        StorageResponse::DeleteKey(r) | StorageResponse::DeleteGroup(r) => {
            json!({ "id": r.id, "response": r.count })
        }
        StorageResponse::List(r) => json!({ "id": r.id, "response": r.entries }),
    };
    frame.to_string()
}

/// Serialize an error frame.
pub fn encode_error(message: &str) -> String {
    json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{
        DeleteResponse, GetGroupResponse, GetKeyResponse, KeyValue, SetResponse,
    };

    #[test]
    fn test_decode_set() {
        let line = r#"{"id":"a","event":"SET","flags":{"persistent":true,"ttl":3600},"key":"k","value":"v","group":"g"}"#;
        let req = decode_request(line).unwrap();
        let msg = req.into_set().unwrap();
        assert_eq!(msg.id, "a");
        assert!(msg.persistent);
        assert_eq!(msg.ttl, 3600);
        assert_eq!(msg.key, "k");
        assert_eq!(msg.value, "v");
        assert_eq!(msg.group, "g");
    }

    #[test]
    fn test_decode_get_key() {
        let req = decode_request(r#"{"id":"b","event":"GET KEY","key":"k"}"#).unwrap();
        let msg = req.into_get_key().unwrap();
        assert_eq!(msg.id, "b");
        assert_eq!(msg.key, "k");
    }

    #[test]
    fn test_decode_list_without_id() {
        let req = decode_request(r#"{"event":"LIST"}"#).unwrap();
        let msg = req.into_list().unwrap();
        assert_eq!(msg.id, "");
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode_request("{not json").unwrap_err();
        assert!(matches!(err, StrataError::Serialization(_)));
    }

    #[test]
    fn test_decode_unknown_event() {
        let err = decode_request(r#"{"id":"x","event":"PING"}"#).unwrap_err();
        assert!(matches!(err, StrataError::UnknownEvent(_)));
        assert!(err.to_string().contains("PING"));
    }

    #[test]
    fn test_decode_missing_required_field() {
        let err = decode_request(r#"{"id":"x","event":"GET KEY"}"#).unwrap_err();
        assert!(matches!(err, StrataError::InvalidInput(_)));

        let err = decode_request(
            r#"{"id":"x","event":"SET","flags":{"persistent":false,"ttl":0},"key":"k","group":"g"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn test_encode_scalar_responses() {
        let frame = encode_response(&StorageResponse::Set(SetResponse {
            id: "a".into(),
            ok: true,
        }));
        assert_eq!(frame, r#"{"id":"a","response":true}"#);

        let frame = encode_response(&StorageResponse::GetKey(GetKeyResponse {
            id: "b".into(),
            value: "v".into(),
        }));
        assert_eq!(frame, r#"{"id":"b","response":"v"}"#);

        let frame = encode_response(&StorageResponse::DeleteKey(DeleteResponse {
            id: "c".into(),
            count: 2,
        }));
        assert_eq!(frame, r#"{"id":"c","response":2}"#);
    }

    #[test]
    fn test_encode_group_response() {
        let frame = encode_response(&StorageResponse::GetGroup(GetGroupResponse {
            id: "d".into(),
            entries: vec![KeyValue {
                key: "k".into(),
                value: "v".into(),
            }],
        }));
        assert_eq!(frame, r#"{"id":"d","response":[{"key":"k","value":"v"}]}"#);
    }

    #[test]
    fn test_encode_error() {
        assert_eq!(
            encode_error("Invalid input: key must be non-empty"),
            r#"{"error":"Invalid input: key must be non-empty"}"#
        );
    }
}
