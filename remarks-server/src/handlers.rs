use anyhow::Context;
use axum::{http::StatusCode, Json};
use remarks_api::{
    Application, ApplicationId, AuthToken, Comment, CommentThread, EditThread, Envelope,
    NewApplication, NewComment, NewSession, NewThread, NewUser, ThreadId, User, Uuid,
};

use crate::{db, extractors::*, service, Error};

type Reply<T> = Result<(StatusCode, Json<Envelope<T>>), Error>;

fn created<T>(payload: T) -> Reply<T> {
    Ok((StatusCode::CREATED, Json(Envelope::created(payload))))
}

fn ok<T>(payload: T) -> Reply<T> {
    Ok((StatusCode::OK, Json(Envelope::ok(payload))))
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadParam {
    pub thread_id: Uuid,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationParam {
    pub application_id: Uuid,
}

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    ApiJson(data): ApiJson<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    db::create_user(&mut *conn, data).await
}

pub async fn admin_create_application(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    ApiJson(data): ApiJson<NewApplication>,
) -> Reply<Application> {
    data.validate()?;
    created(db::create_application(&mut *conn, data).await?)
}

pub async fn auth(
    mut conn: PgConn,
    ApiJson(data): ApiJson<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    Ok(Json(
        db::login_user(&mut *conn, &data)
            .await
            .context("logging user in")?
            .ok_or(Error::permission_denied())?,
    ))
}

pub async fn unauth(user: PreAuth, mut conn: PgConn) -> Result<(), Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::permission_denied()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth, mut conn: PgConn) -> Result<Json<User>, Error> {
    Ok(Json(
        db::fetch_user(&mut *conn, user)
            .await
            .with_context(|| format!("fetching user {:?}", user))?
            .ok_or(Error::permission_denied())?,
    ))
}

pub async fn create_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    ApiQuery(q): ApiQuery<ThreadParam>,
    ApiJson(comment): ApiJson<NewComment>,
) -> Reply<Comment> {
    tracing::debug!(?user, thread=?q.thread_id, "creating comment");
    let mut db = db::PostgresDb {
        conn: &mut *conn,
        user,
    };
    created(service::create_comment(&mut db, ThreadId(q.thread_id), comment).await?)
}

pub async fn create_thread(
    Auth(user): Auth,
    mut conn: PgConn,
    ApiJson(thread): ApiJson<NewThread>,
) -> Reply<CommentThread> {
    tracing::debug!(?user, app=?thread.application_id, "creating comment thread");
    let mut db = db::PostgresDb {
        conn: &mut *conn,
        user,
    };
    created(service::create_thread(&mut db, thread).await?)
}

pub async fn fetch_threads(
    Auth(user): Auth,
    mut conn: PgConn,
    ApiQuery(q): ApiQuery<ApplicationParam>,
) -> Reply<Vec<CommentThread>> {
    let mut db = db::PostgresDb {
        conn: &mut *conn,
        user,
    };
    ok(service::threads_for_application(&mut db, ApplicationId(q.application_id)).await?)
}

pub async fn update_thread(
    Auth(user): Auth,
    mut conn: PgConn,
    ApiPath(thread_id): ApiPath<Uuid>,
    ApiJson(edit): ApiJson<EditThread>,
) -> Reply<CommentThread> {
    tracing::debug!(?user, thread=?thread_id, "updating comment thread");
    let mut db = db::PostgresDb {
        conn: &mut *conn,
        user,
    };
    ok(service::update_thread(&mut db, ThreadId(thread_id), edit).await?)
}
