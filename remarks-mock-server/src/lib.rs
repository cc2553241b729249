use std::collections::{hash_map, HashMap};

use async_trait::async_trait;
use chrono::TimeZone;
use remarks_api::{
    Application, ApplicationId, Comment, CommentDraft, CommentId, CommentThread, Db, Error,
    NewApplication, NewUser, Permission, ThreadDraft, ThreadId, ThreadUpdate, Time, User, UserId,
    Uuid,
};

/// In-memory stand-in for the postgres-backed server
///
/// Creation dates come from a synthetic clock that moves forward by one
/// millisecond on every write, so that ordering by date is always strict.
pub struct MockServer {
    users: HashMap<UserId, User>,
    applications: HashMap<ApplicationId, Application>,
    // both in insertion order
    threads: Vec<CommentThread>,
    comments: Vec<Comment>,
    clock: Time,
    comment_queries: usize,
    comment_saves_left: Option<usize>,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: HashMap::new(),
            applications: HashMap::new(),
            threads: Vec::new(),
            comments: Vec::new(),
            clock: chrono::Utc
                .timestamp_opt(1_600_000_000, 0)
                .single()
                .expect("valid mock epoch"),
            comment_queries: 0,
            comment_saves_left: None,
        }
    }

    pub fn admin_create_user(&mut self, u: NewUser) -> Result<User, Error> {
        u.validate()?;

        if self.users.values().any(|db| db.name == u.name) {
            return Err(Error::NameAlreadyUsed(u.name));
        }

        match self.users.entry(u.id) {
            hash_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(u.id.0)),
            hash_map::Entry::Vacant(entry) => Ok(entry
                .insert(User {
                    id: u.id,
                    name: u.name,
                })
                .clone()),
        }
    }

    pub fn admin_create_application(&mut self, a: NewApplication) -> Result<Application, Error> {
        a.validate()?;
        match self.applications.entry(a.id) {
            hash_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(a.id.0)),
            hash_map::Entry::Vacant(entry) => Ok(entry
                .insert(Application {
                    id: a.id,
                    name: a.name,
                    policies: a.policies,
                })
                .clone()),
        }
    }

    /// Storage handle acting on behalf of `user`
    pub fn db_for(&mut self, user: UserId) -> MockDb<'_> {
        MockDb { server: self, user }
    }

    pub fn threads(&self) -> &[CommentThread] {
        &self.threads
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Number of times comments were queried since the server was created
    pub fn comment_queries(&self) -> usize {
        self.comment_queries
    }

    /// Let the next `n` comment saves succeed, then fail all the following ones
    pub fn fail_comment_saves_after(&mut self, n: usize) {
        self.comment_saves_left = Some(n);
    }

    fn tick(&mut self) -> Time {
        self.clock = self.clock + chrono::Duration::milliseconds(1);
        self.clock
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

pub struct MockDb<'a> {
    server: &'a mut MockServer,
    user: UserId,
}

#[async_trait]
impl<'a> Db for MockDb<'a> {
    async fn current_user(&mut self) -> anyhow::Result<Option<User>> {
        Ok(self.server.users.get(&self.user).cloned())
    }

    async fn find_application(
        &mut self,
        id: ApplicationId,
        perm: Permission,
    ) -> anyhow::Result<Option<Application>> {
        Ok(self
            .server
            .applications
            .get(&id)
            .filter(|a| a.policies.allows(self.user, perm))
            .cloned())
    }

    async fn find_thread(
        &mut self,
        id: ThreadId,
        perm: Permission,
    ) -> anyhow::Result<Option<CommentThread>> {
        Ok(self
            .server
            .threads
            .iter()
            .find(|t| t.id == id && t.policies.allows(self.user, perm))
            .cloned())
    }

    async fn find_threads_for_application(
        &mut self,
        app: ApplicationId,
        perm: Permission,
    ) -> anyhow::Result<Vec<CommentThread>> {
        Ok(self
            .server
            .threads
            .iter()
            .filter(|t| t.application_id == app && t.policies.allows(self.user, perm))
            .cloned()
            .collect())
    }

    async fn save_thread(&mut self, t: ThreadDraft) -> anyhow::Result<CommentThread> {
        let thread = CommentThread {
            id: ThreadId(Uuid::new_v4()),
            application_id: t.application_id,
            resolved: false,
            policies: t.policies,
            created_at: self.server.tick(),
            comments: Vec::new(),
        };
        self.server.threads.push(thread.clone());
        Ok(thread)
    }

    async fn update_thread(
        &mut self,
        id: ThreadId,
        update: &ThreadUpdate,
        perm: Permission,
    ) -> anyhow::Result<Option<CommentThread>> {
        let user = self.user;
        let thread = self
            .server
            .threads
            .iter_mut()
            .find(|t| t.id == id && t.policies.allows(user, perm));
        Ok(thread.map(|t| {
            if let Some(resolved) = update.resolved {
                t.resolved = resolved;
            }
            t.clone()
        }))
    }

    async fn save_comment(&mut self, c: CommentDraft) -> anyhow::Result<Comment> {
        if let Some(left) = &mut self.server.comment_saves_left {
            anyhow::ensure!(*left > 0, "mock store refused to save comment");
            *left -= 1;
        }
        let comment = Comment {
            id: CommentId(Uuid::new_v4()),
            thread_id: c.thread_id,
            author_name: c.author_name,
            body: c.body,
            policies: c.policies,
            created_at: self.server.tick(),
        };
        self.server.comments.push(comment.clone());
        Ok(comment)
    }

    async fn find_comments_for_threads(
        &mut self,
        threads: &[ThreadId],
    ) -> anyhow::Result<Vec<Comment>> {
        self.server.comment_queries += 1;
        let mut res = self
            .server
            .comments
            .iter()
            .filter(|c| threads.contains(&c.thread_id))
            .cloned()
            .collect::<Vec<_>>();
        res.sort_by_key(|c| c.created_at);
        Ok(res)
    }
}
