use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod application;
pub use application::{Application, ApplicationId, NewApplication};

mod auth;
pub use auth::{AuthToken, NewSession};

mod comment;
pub use comment::{Comment, CommentDraft, CommentId, NewComment};

mod db;
pub use db::Db;

mod envelope;
pub use envelope::Envelope;

mod error;
pub use error::Error;

mod policy;
pub use policy::{Permission, PolicySet, ResourceKind};

mod thread;
pub use thread::{CommentThread, EditThread, NewThread, ThreadDraft, ThreadId, ThreadUpdate};

mod user;
pub use user::{NewUser, User, UserId};

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
