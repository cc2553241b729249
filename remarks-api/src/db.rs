use async_trait::async_trait;

use crate::{
    Application, ApplicationId, Comment, CommentDraft, CommentThread, Permission, ThreadDraft,
    ThreadId, ThreadUpdate, User,
};

/// Storage as seen by one authenticated request
///
/// Lookups taking a `Permission` only return resources on which the user the
/// handle was opened for holds that permission. Existence and permission are
/// checked in the same query, so "missing" and "forbidden" look the same.
#[async_trait]
pub trait Db: Send {
    /// `None` if the session's user does not exist (anymore)
    async fn current_user(&mut self) -> anyhow::Result<Option<User>>;

    async fn find_application(
        &mut self,
        id: ApplicationId,
        perm: Permission,
    ) -> anyhow::Result<Option<Application>>;

    async fn find_thread(
        &mut self,
        id: ThreadId,
        perm: Permission,
    ) -> anyhow::Result<Option<CommentThread>>;

    /// Threads of an application, oldest first, with empty comment lists
    async fn find_threads_for_application(
        &mut self,
        app: ApplicationId,
        perm: Permission,
    ) -> anyhow::Result<Vec<CommentThread>>;

    async fn save_thread(&mut self, t: ThreadDraft) -> anyhow::Result<CommentThread>;

    async fn update_thread(
        &mut self,
        id: ThreadId,
        update: &ThreadUpdate,
        perm: Permission,
    ) -> anyhow::Result<Option<CommentThread>>;

    async fn save_comment(&mut self, c: CommentDraft) -> anyhow::Result<Comment>;

    /// All comments of these threads in one query, oldest first
    async fn find_comments_for_threads(
        &mut self,
        threads: &[ThreadId],
    ) -> anyhow::Result<Vec<Comment>>;
}
