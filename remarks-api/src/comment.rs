use uuid::Uuid;

use crate::{Error, PolicySet, ThreadId, Time};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub thread_id: ThreadId,
    pub author_name: String,
    pub body: String,
    pub policies: PolicySet,

    /// Set by the store; comments of a thread are always listed in this order
    pub created_at: Time,
}

/// A comment as submitted by a client
///
/// Fields a client may send but does not control (`id`, `threadId`,
/// `policies`, `createdAt`) are not part of this type and get dropped while
/// deserializing.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub body: String,

    /// Always filled in from the session; submitting a non-blank one is an error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

impl NewComment {
    pub fn new(body: String) -> NewComment {
        NewComment {
            body,
            author_name: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let Some(name) = &self.author_name {
            if !name.trim().is_empty() {
                return Err(Error::AuthorNameNotAllowed(name.clone()));
            }
        }
        crate::validate_string(&self.body)
    }
}

/// A comment ready to be persisted, before the store assigned its id and date
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentDraft {
    pub thread_id: ThreadId,
    pub author_name: String,
    pub body: String,
    pub policies: PolicySet,
}
