use uuid::Uuid;

use crate::{ApplicationId, Comment, Error, NewComment, PolicySet, Time};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ThreadId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    pub id: ThreadId,
    pub application_id: ApplicationId,
    pub resolved: bool,
    pub policies: PolicySet,
    pub created_at: Time,

    /// Only filled in for transport, in chronological order
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThread {
    pub application_id: ApplicationId,

    /// Initial comments, persisted in this order right after the thread
    #[serde(default)]
    pub comments: Vec<NewComment>,
}

impl NewThread {
    pub fn validate(&self) -> Result<(), Error> {
        for c in &self.comments {
            c.validate()?;
        }
        Ok(())
    }
}

/// A thread ready to be persisted, before the store assigned its id and date
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ThreadDraft {
    pub application_id: ApplicationId,
    pub policies: PolicySet,
}

/// A thread as submitted for an update
///
/// Clients usually send back the whole thread; only the fields copied by
/// `allowed_changes` have any effect.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditThread {
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default)]
    pub comments: Option<Vec<NewComment>>,
}

impl EditThread {
    pub fn allowed_changes(&self) -> ThreadUpdate {
        ThreadUpdate {
            resolved: self.resolved,
        }
    }
}

/// Partial update of a stored thread; `None` leaves the field untouched
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThreadUpdate {
    pub resolved: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_only_keeps_resolved() {
        let edit = EditThread {
            application_id: Some(ApplicationId(Uuid::new_v4())),
            resolved: Some(true),
            comments: Some(vec![NewComment::new(String::from("sneaky"))]),
        };
        assert_eq!(
            edit.allowed_changes(),
            ThreadUpdate {
                resolved: Some(true)
            }
        );
        assert_eq!(EditThread::default().allowed_changes(), ThreadUpdate::default());
    }

    #[test]
    fn new_thread_validates_every_comment() {
        let mut t = NewThread {
            application_id: ApplicationId(Uuid::new_v4()),
            comments: vec![
                NewComment::new(String::from("one")),
                NewComment::new(String::from("two")),
            ],
        };
        assert_eq!(t.validate(), Ok(()));
        t.comments[1].author_name = Some(String::from("bob"));
        assert_eq!(
            t.validate(),
            Err(Error::AuthorNameNotAllowed(String::from("bob")))
        );
    }
}
