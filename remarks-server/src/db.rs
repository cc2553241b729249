use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use remarks_api::{
    Application, ApplicationId, AuthToken, Comment, CommentDraft, CommentId, CommentThread, Db,
    NewApplication, NewSession, NewUser, Permission, PolicySet, ThreadDraft, ThreadId,
    ThreadUpdate, Time, User, UserId, Uuid,
};
use sqlx::{postgres::PgRow, types::Json, Row};

use crate::Error;

const THREAD_COLUMNS: &str = "id, application_id, resolved, policies, created_at";
const COMMENT_COLUMNS: &str = "id, thread_id, author_name, body, policies, created_at";

pub async fn create_user(conn: &mut sqlx::PgConnection, u: NewUser) -> Result<(), Error> {
    let conflict = sqlx::query("SELECT id, name FROM users WHERE id = $1 OR name = $2")
        .bind(u.id.0)
        .bind(&u.name)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("checking for conflicts before creating user {:?}", u.id))?;
    if let Some(row) = conflict {
        let id: Uuid = row.try_get("id").context("retrieving the id field")?;
        return Err(match id == u.id.0 {
            true => Error::uuid_already_used(id),
            false => Error::name_already_used(u.name),
        });
    }

    sqlx::query("INSERT INTO users (id, name, password_hash) VALUES ($1, $2, $3)")
        .bind(u.id.0)
        .bind(&u.name)
        .bind(&u.initial_password_hash)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting user {:?}", u.id))?;
    tracing::info!(user=?u.id, name=%u.name, "created user");
    Ok(())
}

pub async fn create_application(
    conn: &mut sqlx::PgConnection,
    a: NewApplication,
) -> Result<Application, Error> {
    let res = sqlx::query(
        "INSERT INTO applications (id, name, policies) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
    )
    .bind(a.id.0)
    .bind(&a.name)
    .bind(Json(&a.policies))
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting application {:?}", a.id))?;
    if res.rows_affected() != 1 {
        return Err(Error::uuid_already_used(a.id.0));
    }
    tracing::info!(app=?a.id, name=%a.name, "created application");
    Ok(Application {
        id: a.id,
        name: a.name,
        policies: a.policies,
    })
}

pub async fn login_user(
    conn: &mut sqlx::PgConnection,
    s: &NewSession,
) -> anyhow::Result<Option<AuthToken>> {
    let user = sqlx::query("SELECT id, password_hash FROM users WHERE name = $1")
        .bind(&s.user)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching password hash for {:?}", s.user))?;
    let Some(user) = user else {
        return Ok(None);
    };
    let id: Uuid = user.try_get("id").context("retrieving the id field")?;
    let hash: String = user
        .try_get("password_hash")
        .context("retrieving the password_hash field")?;
    if !bcrypt::verify(&s.password, &hash).context("checking password hash")? {
        return Ok(None);
    }

    let token = AuthToken(Uuid::new_v4());
    sqlx::query(
        "INSERT INTO sessions (id, user_id, name, login_time, last_active) VALUES ($1, $2, $3, now(), now())",
    )
    .bind(token.0)
    .bind(id)
    .bind(&s.device)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting session for {:?}", s.user))?;
    Ok(Some(token))
}

pub async fn logout_user(conn: &mut sqlx::PgConnection, token: &AuthToken) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token.0)
        .execute(conn)
        .await
        .context("deleting session")?;
    Ok(res.rows_affected() == 1)
}

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<UserId, Error> {
    let row = sqlx::query(
        "UPDATE sessions SET last_active = now() WHERE id = $1 RETURNING user_id",
    )
    .bind(token.0)
    .fetch_optional(conn)
    .await
    .context("recovering session")?
    .ok_or_else(Error::permission_denied)?;
    Ok(UserId(
        row.try_get("user_id")
            .context("retrieving the user_id field")?,
    ))
}

pub async fn fetch_user(conn: &mut sqlx::PgConnection, id: UserId) -> anyhow::Result<Option<User>> {
    let row = sqlx::query("SELECT name FROM users WHERE id = $1")
        .bind(id.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("fetching user {:?}", id))?;
    row.map(|r| {
        Ok(User {
            id,
            name: r.try_get("name").context("retrieving the name field")?,
        })
    })
    .transpose()
}

fn thread_from_row(row: &PgRow) -> anyhow::Result<CommentThread> {
    Ok(CommentThread {
        id: ThreadId(row.try_get("id").context("retrieving the id field")?),
        application_id: ApplicationId(
            row.try_get("application_id")
                .context("retrieving the application_id field")?,
        ),
        resolved: row
            .try_get("resolved")
            .context("retrieving the resolved field")?,
        policies: row
            .try_get::<Json<PolicySet>, _>("policies")
            .context("retrieving the policies field")?
            .0,
        created_at: row
            .try_get::<Time, _>("created_at")
            .context("retrieving the created_at field")?,
        comments: Vec::new(),
    })
}

fn comment_from_row(row: &PgRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        thread_id: ThreadId(
            row.try_get("thread_id")
                .context("retrieving the thread_id field")?,
        ),
        author_name: row
            .try_get("author_name")
            .context("retrieving the author_name field")?,
        body: row.try_get("body").context("retrieving the body field")?,
        policies: row
            .try_get::<Json<PolicySet>, _>("policies")
            .context("retrieving the policies field")?
            .0,
        created_at: row
            .try_get::<Time, _>("created_at")
            .context("retrieving the created_at field")?,
    })
}

/// `Db` backed by one postgres connection, acting for `user`
///
/// Permission checks use the jsonb `?` operator on the stored policy set,
/// within the same statement as the lookup.
pub struct PostgresDb<'a> {
    pub conn: &'a mut sqlx::PgConnection,
    pub user: UserId,
}

#[async_trait]
impl<'a> Db for PostgresDb<'a> {
    async fn current_user(&mut self) -> anyhow::Result<Option<User>> {
        fetch_user(&mut *self.conn, self.user).await
    }

    async fn find_application(
        &mut self,
        id: ApplicationId,
        perm: Permission,
    ) -> anyhow::Result<Option<Application>> {
        let row = sqlx::query(
            "SELECT id, name, policies FROM applications WHERE id = $1 AND policies -> $2 ? $3",
        )
        .bind(id.0)
        .bind(perm.as_str())
        .bind(self.user.0.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("querying application {:?} for {perm}", id))?;
        row.map(|r| {
            Ok(Application {
                id,
                name: r.try_get("name").context("retrieving the name field")?,
                policies: r
                    .try_get::<Json<PolicySet>, _>("policies")
                    .context("retrieving the policies field")?
                    .0,
            })
        })
        .transpose()
    }

    async fn find_thread(
        &mut self,
        id: ThreadId,
        perm: Permission,
    ) -> anyhow::Result<Option<CommentThread>> {
        sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM comment_threads WHERE id = $1 AND policies -> $2 ? $3"
        ))
        .bind(id.0)
        .bind(perm.as_str())
        .bind(self.user.0.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("querying thread {:?} for {perm}", id))?
        .as_ref()
        .map(thread_from_row)
        .transpose()
    }

    async fn find_threads_for_application(
        &mut self,
        app: ApplicationId,
        perm: Permission,
    ) -> anyhow::Result<Vec<CommentThread>> {
        sqlx::query(&format!(
            "
                SELECT {THREAD_COLUMNS}
                    FROM comment_threads
                WHERE application_id = $1
                AND policies -> $2 ? $3
                ORDER BY created_at, seq
            "
        ))
        .bind(app.0)
        .bind(perm.as_str())
        .bind(self.user.0.to_string())
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("querying threads of application {:?} for {perm}", app))?
        .iter()
        .map(thread_from_row)
        .collect()
    }

    async fn save_thread(&mut self, t: ThreadDraft) -> anyhow::Result<CommentThread> {
        let row = sqlx::query(&format!(
            "INSERT INTO comment_threads (id, application_id, policies) VALUES ($1, $2, $3) RETURNING {THREAD_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(t.application_id.0)
        .bind(Json(&t.policies))
        .fetch_one(&mut *self.conn)
        .await
        .with_context(|| format!("inserting thread on application {:?}", t.application_id))?;
        thread_from_row(&row)
    }

    async fn update_thread(
        &mut self,
        id: ThreadId,
        update: &ThreadUpdate,
        perm: Permission,
    ) -> anyhow::Result<Option<CommentThread>> {
        sqlx::query(&format!(
            "
                UPDATE comment_threads
                SET resolved = COALESCE($2, resolved)
                WHERE id = $1
                AND policies -> $3 ? $4
                RETURNING {THREAD_COLUMNS}
            "
        ))
        .bind(id.0)
        .bind(update.resolved)
        .bind(perm.as_str())
        .bind(self.user.0.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("updating thread {:?}", id))?
        .as_ref()
        .map(thread_from_row)
        .transpose()
    }

    async fn save_comment(&mut self, c: CommentDraft) -> anyhow::Result<Comment> {
        let row = sqlx::query(&format!(
            "
                INSERT INTO comments (id, thread_id, author_name, body, policies)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {COMMENT_COLUMNS}
            "
        ))
        .bind(Uuid::new_v4())
        .bind(c.thread_id.0)
        .bind(&c.author_name)
        .bind(&c.body)
        .bind(Json(&c.policies))
        .fetch_one(&mut *self.conn)
        .await
        .with_context(|| format!("inserting comment on thread {:?}", c.thread_id))?;
        comment_from_row(&row)
    }

    async fn find_comments_for_threads(
        &mut self,
        threads: &[ThreadId],
    ) -> anyhow::Result<Vec<Comment>> {
        let ids = threads.iter().map(|t| t.0).collect::<Vec<Uuid>>();
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE thread_id = ANY($1) ORDER BY created_at, seq"
        );
        let mut rows = sqlx::query(&query).bind(ids).fetch(&mut *self.conn);
        let mut res = Vec::new();
        while let Some(row) = rows.try_next().await.context("querying comments table")? {
            res.push(comment_from_row(&row)?);
        }
        Ok(res)
    }
}
