use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::{Envelope, ResourceKind};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("No {kind} with id {id}, or permission denied")]
    NotFound { kind: ResourceKind, id: String },

    #[error("Author name cannot be set by the client (got {0:?})")]
    AuthorNameNotAllowed(String),

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),

    #[error("Malformed request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::AuthorNameNotAllowed(_) => StatusCode::BAD_REQUEST,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The `error` object of a response envelope
    pub fn details(&self) -> serde_json::Value {
        match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NotFound { kind, id } => json!({
                "message": format!("no {kind} found with id {id}"),
                "type": "not-found",
                "kind": kind,
                "id": id,
            }),
            Error::AuthorNameNotAllowed(n) => json!({
                "message": "the author name is set from the session and cannot be submitted",
                "type": "author-name-not-allowed",
                "name": n,
            }),
            Error::UuidAlreadyUsed(u) => json!({
                "message": "uuid conflict",
                "type": "conflict-uuid",
                "uuid": u,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid character in a user name",
                "type": "invalid-name",
                "name": n,
            }),
            Error::InvalidRequest(msg) => json!({
                "message": msg,
                "type": "invalid-request",
            }),
        }
    }

    /// Full response body for this error
    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&Envelope::<()>::failure(self)).expect("serializing error envelope")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let env: Envelope<serde_json::Value> =
            serde_json::from_slice(body).context("parsing error envelope")?;
        let details = env
            .error
            .ok_or_else(|| anyhow!("envelope does not carry an error"))?;
        Error::from_details(&details)
    }

    pub fn from_details(data: &serde_json::Value) -> anyhow::Result<Error> {
        let string_field = |name: &str| {
            data.get(name)
                .and_then(|s| s.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error is missing its {name:?} field"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "permission-denied" => Error::PermissionDenied,
                "not-found" => Error::NotFound {
                    kind: data
                        .get("kind")
                        .cloned()
                        .map(serde_json::from_value::<ResourceKind>)
                        .transpose()
                        .context("parsing the kind of a not-found error")?
                        .ok_or_else(|| anyhow!("error is a not-found without a kind"))?,
                    id: string_field("id")?,
                },
                "author-name-not-allowed" => Error::AuthorNameNotAllowed(string_field("name")?),
                "conflict-uuid" => Error::UuidAlreadyUsed(
                    data.get("uuid")
                        .and_then(|uuid| uuid.as_str())
                        .and_then(|uuid| Uuid::from_str(uuid).ok())
                        .ok_or_else(|| anyhow!("error is a uuid conflict without a proper uuid"))?,
                ),
                "conflict-name" => Error::NameAlreadyUsed(string_field("name")?),
                "null-byte" => Error::NullByteInString(string_field("string")?),
                "invalid-name" => Error::InvalidName(string_field("name")?),
                "invalid-request" => Error::InvalidRequest(string_field("message")?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_kind_and_id() {
        let err = Error::NotFound {
            kind: ResourceKind::Thread,
            id: String::from("abc"),
        };
        assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&err.contents()).unwrap();
        assert_eq!(body["status"], json!(404));
        assert_eq!(body["payload"], serde_json::Value::Null);
        assert_eq!(body["error"]["kind"], json!("comment thread"));
        assert_eq!(body["error"]["id"], json!("abc"));
        assert_eq!(Error::parse(&err.contents()).unwrap(), err);
    }

    #[test]
    fn author_name_rejection_is_a_client_error() {
        let err = Error::AuthorNameNotAllowed(String::from("mallory"));
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
        assert_eq!(Error::parse(&err.contents()).unwrap(), err);
    }

    #[test]
    fn malformed_requests_are_client_errors() {
        let err = Error::InvalidRequest(String::from("missing field `threadId`"));
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(&err.contents()).unwrap();
        assert_eq!(body["error"]["type"], json!("invalid-request"));
        assert_eq!(Error::parse(&err.contents()).unwrap(), err);
    }

    #[test]
    fn unknown_types_are_refused() {
        let body = br#"{"status":418,"payload":null,"error":{"type":"teapot"}}"#;
        assert!(Error::parse(body).is_err());
        let body = br#"{"status":200,"payload":1,"error":null}"#;
        assert!(Error::parse(body).is_err());
    }
}
