//! Comment and thread operations, independent of the storage backend

use std::collections::HashMap;

use anyhow::Context;
use remarks_api::{
    ApplicationId, Comment, CommentDraft, CommentThread, Db, EditThread, NewComment, NewThread,
    Permission, ResourceKind, ThreadDraft, ThreadId, User,
};

use crate::Error;

async fn current_user<D: Db>(db: &mut D) -> Result<User, Error> {
    db.current_user()
        .await
        .context("resolving session user")?
        .ok_or_else(Error::permission_denied)
}

pub async fn create_comment<D: Db>(
    db: &mut D,
    thread_id: ThreadId,
    comment: NewComment,
) -> Result<Comment, Error> {
    comment.validate()?;

    let thread = db
        .find_thread(thread_id, Permission::CommentOnThread)
        .await
        .with_context(|| format!("fetching thread {:?}", thread_id))?
        .ok_or_else(|| Error::not_found(ResourceKind::Thread, thread_id.0))?;
    let policies = thread
        .policies
        .child_policies(ResourceKind::Thread, ResourceKind::Comment);
    let author = current_user(db).await?;

    let saved = db
        .save_comment(CommentDraft {
            thread_id,
            author_name: author.name,
            body: comment.body,
            policies,
        })
        .await
        .with_context(|| format!("saving comment on thread {:?}", thread_id))?;
    tracing::debug!(comment=?saved.id, thread=?thread_id, "comment created");
    Ok(saved)
}

pub async fn create_thread<D: Db>(db: &mut D, thread: NewThread) -> Result<CommentThread, Error> {
    // refuse the whole batch before anything gets written
    thread.validate()?;
    let NewThread {
        application_id,
        comments,
    } = thread;

    let app = db
        .find_application(application_id, Permission::CommentOnApplication)
        .await
        .with_context(|| format!("fetching application {:?}", application_id))?
        .ok_or_else(|| Error::not_found(ResourceKind::Application, application_id.0))?;
    let policies = app
        .policies
        .child_policies(ResourceKind::Application, ResourceKind::Thread);
    current_user(db).await?;

    let mut saved = db
        .save_thread(ThreadDraft {
            application_id,
            policies,
        })
        .await
        .with_context(|| format!("saving thread on application {:?}", application_id))?;
    tracing::debug!(
        thread=?saved.id,
        app=?application_id,
        num_comments=comments.len(),
        "thread created"
    );

    // One at a time: the creation dates are what orders comments when reading
    // them back. A failure leaves the thread and the comments before it saved.
    for c in comments {
        let c = create_comment(db, saved.id, c).await?;
        saved.comments.push(c);
    }
    Ok(saved)
}

pub async fn update_thread<D: Db>(
    db: &mut D,
    thread_id: ThreadId,
    edit: EditThread,
) -> Result<CommentThread, Error> {
    let update = edit.allowed_changes();
    let thread = db
        .update_thread(thread_id, &update, Permission::ManageThread)
        .await
        .with_context(|| format!("updating thread {:?}", thread_id))?
        .ok_or_else(|| Error::not_found(ResourceKind::Thread, thread_id.0))?;
    tracing::debug!(thread=?thread_id, ?update, "thread updated");
    Ok(thread)
}

pub async fn threads_for_application<D: Db>(
    db: &mut D,
    app: ApplicationId,
) -> Result<Vec<CommentThread>, Error> {
    let mut threads = db
        .find_threads_for_application(app, Permission::ReadThread)
        .await
        .with_context(|| format!("fetching threads of application {:?}", app))?;
    if threads.is_empty() {
        return Ok(threads);
    }

    let mut idx = HashMap::with_capacity(threads.len());
    for (i, t) in threads.iter_mut().enumerate() {
        t.comments.clear();
        idx.insert(t.id, i);
    }
    let ids = threads.iter().map(|t| t.id).collect::<Vec<_>>();

    let comments = db
        .find_comments_for_threads(&ids)
        .await
        .with_context(|| format!("fetching comments of application {:?}", app))?;
    for c in comments {
        match idx.get(&c.thread_id) {
            Some(&i) => threads[i].comments.push(c),
            None => {
                tracing::warn!(comment=?c.id, thread=?c.thread_id, "comment for unrequested thread")
            }
        }
    }
    Ok(threads)
}
