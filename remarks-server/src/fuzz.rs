#![cfg(test)]

use axum::http;
use bolero::generator::TypeGenerator;
use futures::Future;
use remarks_api::{
    Application, ApplicationId, AuthToken, Comment, CommentThread, EditThread, Envelope,
    Error as ApiError, NewApplication, NewComment, NewSession, NewThread, NewUser, Permission,
    PolicySet, ResourceKind, ThreadId, User, UserId, Uuid,
};
use remarks_mock_server::MockServer;
use std::{fmt::Debug, panic::AssertUnwindSafe, path::Path};
use tower::ServiceExt;

use crate::{create_sqlx_pool, db, extractors::*, service, Error, MIGRATOR};

fn build_pg_cluster(data: &Path) -> postgresfixture::cluster::Cluster {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    postgresfixture::cluster::Cluster::new(
        data,
        runtime.expect("postgresql seems to not be installed in path"),
    )
}

/// Spins up a throwaway cluster, migrates a `test_db` database and hands it to `test`
fn with_test_db(test: impl FnOnce(&tokio::runtime::Runtime, &sqlx::PgPool)) {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
    let lockfile = tempfile::tempfile().expect("creating tempfile");
    let datadir = tempfile::tempdir().expect("creating tempdir");
    let datadir_path: &Path = datadir.as_ref();
    let cluster = build_pg_cluster(datadir_path);
    let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
    postgresfixture::coordinate::run_and_destroy(
        &cluster,
        lockfile.into(),
        AssertUnwindSafe(|| {
            cluster
                .createdb("test_db")
                .expect("creating test_db database");
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed initializing tokio runtime");
            let pool = runtime.block_on(async move {
                let pool = create_sqlx_pool(&format!(
                    "postgresql://?host={datadir_path}&dbname=test_db"
                ))
                .await
                .expect("creating sqlx pool");
                MIGRATOR
                    .run(&pool)
                    .await
                    .expect("failed applying migrations");
                pool
            });
            test(&runtime, &pool);
        }),
    )
    .expect("coordinating spinup and shutdown of the pg cluster");
}

/// Runs one test case, then empties the database even if the case panicked
fn run_and_reset<T, F, Fut>(
    runtime: &tokio::runtime::Runtime,
    pool: &sqlx::PgPool,
    v: T,
    test: F,
) where
    T: Debug,
    F: FnOnce(sqlx::PgPool, T) -> Fut,
    Fut: Future<Output = ()>,
{
    let v_str = format!("{v:?}");
    let res = std::panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(test(pool.clone(), v))
    }));
    runtime.block_on(async {
        sqlx::query(include_str!("../reset-test-db.sql"))
            .execute(pool)
            .await
            .expect("failed cleaning up database");
    });
    if let Err(e) = res {
        eprintln!("test case failed with value {v_str}");
        std::panic::resume_unwind(e);
    }
}

macro_rules! do_sqlx_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            with_test_db(|runtime, pool| {
                let runtime = AssertUnwindSafe(runtime);
                let pool = AssertUnwindSafe(pool);
                bolero::check!()
                    .with_type::<$typ>()
                    .cloned()
                    .for_each(move |v| run_and_reset(&runtime, &pool, v, $fn))
            })
        }
    };
    ( $name:ident, $fn:expr ) => {
        #[test]
        fn $name() {
            with_test_db(|runtime, pool| {
                run_and_reset(runtime, pool, (), |pool, ()| ($fn)(pool))
            })
        }
    };
}

fn new_user(name: &str) -> NewUser {
    NewUser {
        id: UserId(Uuid::new_v4()),
        name: String::from(name),
        initial_password_hash: String::from("unused"),
    }
}

struct Fixture {
    alice: User,
    bob: User,
    carol: User,
    app: Application,
    empty_app: Application,
}

/// alice can comment on the app, bob can only read it and manage it, carol has no access
async fn fixture(pool: &sqlx::PgPool) -> Fixture {
    let mut conn = pool.acquire().await.expect("getting seed connection");
    let mut users = Vec::new();
    for name in ["alice", "bob", "carol"] {
        let u = new_user(name);
        db::create_user(&mut conn, u.clone())
            .await
            .expect("creating user");
        users.push(User {
            id: u.id,
            name: u.name,
        });
    }
    let (alice, bob, carol) = (users[0].clone(), users[1].clone(), users[2].clone());
    let policies = PolicySet::new()
        .with(Permission::ReadApplication, [alice.id, bob.id])
        .with(Permission::CommentOnApplication, [alice.id])
        .with(Permission::ManageApplication, [bob.id]);
    let app = db::create_application(
        &mut conn,
        NewApplication {
            id: ApplicationId(Uuid::new_v4()),
            name: String::from("app1"),
            policies: policies.clone(),
        },
    )
    .await
    .expect("creating application");
    let empty_app = db::create_application(
        &mut conn,
        NewApplication {
            id: ApplicationId(Uuid::new_v4()),
            name: String::from("app2"),
            policies,
        },
    )
    .await
    .expect("creating application");
    Fixture {
        alice,
        bob,
        carol,
        app,
        empty_app,
    }
}

fn new_thread(app: ApplicationId, texts: &[&str]) -> NewThread {
    NewThread {
        application_id: app,
        comments: texts
            .iter()
            .map(|t| NewComment::new(String::from(*t)))
            .collect(),
    }
}

async fn create_thread(pool: &sqlx::PgPool, user: UserId, t: NewThread) -> CommentThread {
    let mut conn = pool.acquire().await.expect("getting connection");
    let mut db = db::PostgresDb {
        conn: &mut conn,
        user,
    };
    service::create_thread(&mut db, t)
        .await
        .expect("creating thread")
}

async fn list_threads(
    pool: &sqlx::PgPool,
    user: UserId,
    app: ApplicationId,
) -> Vec<CommentThread> {
    let mut conn = pool.acquire().await.expect("getting connection");
    let mut db = db::PostgresDb {
        conn: &mut conn,
        user,
    };
    service::threads_for_application(&mut db, app)
        .await
        .expect("listing threads")
}

fn bodies(comments: &[Comment]) -> Vec<&str> {
    comments.iter().map(|c| c.body.as_str()).collect()
}

do_sqlx_test!(pg_thread_is_stored_with_inherited_policies, |pool: sqlx::PgPool| async move {
    let f = fixture(&pool).await;
    let thread = create_thread(&pool, f.alice.id, new_thread(f.app.id, &["hi"])).await;

    assert_eq!(thread.application_id, f.app.id);
    assert!(!thread.resolved);
    assert_eq!(
        thread.policies,
        f.app
            .policies
            .child_policies(ResourceKind::Application, ResourceKind::Thread)
    );
    assert_eq!(thread.comments.len(), 1);
    let c = &thread.comments[0];
    assert_eq!(c.author_name, "alice");
    assert_eq!(c.thread_id, thread.id);
    assert_eq!(
        c.policies,
        thread
            .policies
            .child_policies(ResourceKind::Thread, ResourceKind::Comment)
    );

    // the jsonb policies and timestamps survive the round trip
    assert_eq!(list_threads(&pool, f.bob.id, f.app.id).await, vec![thread]);
});

do_sqlx_test!(pg_initial_comments_keep_submission_order, |pool: sqlx::PgPool| async move {
    let f = fixture(&pool).await;
    let texts = ["c1", "c2", "c3", "c4", "c5"];
    let thread = create_thread(&pool, f.alice.id, new_thread(f.app.id, &texts)).await;
    assert_eq!(bodies(&thread.comments), texts);

    let listed = list_threads(&pool, f.alice.id, f.app.id).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(bodies(&listed[0].comments), texts);
    for w in listed[0].comments.windows(2) {
        assert!(w[0].created_at <= w[1].created_at);
    }
});

do_sqlx_test!(pg_threads_are_read_back_with_their_comments, |pool: sqlx::PgPool| async move {
    let f = fixture(&pool).await;
    let t1 = create_thread(&pool, f.alice.id, new_thread(f.app.id, &["t1 c1"])).await;
    let t2 = create_thread(&pool, f.alice.id, new_thread(f.app.id, &["t2 c1", "t2 c2"])).await;
    let mut conn = pool.acquire().await.expect("getting connection");
    for (t, body) in [(t1.id, "t1 c2"), (t2.id, "t2 c3"), (t1.id, "t1 c3")] {
        let mut db = db::PostgresDb {
            conn: &mut conn,
            user: f.alice.id,
        };
        service::create_comment(&mut db, t, NewComment::new(String::from(body)))
            .await
            .expect("creating comment");
    }
    drop(conn);

    let threads = list_threads(&pool, f.bob.id, f.app.id).await;
    let ids = threads.iter().map(|t| t.id).collect::<Vec<_>>();
    assert_eq!(ids, [t1.id, t2.id]);
    assert_eq!(bodies(&threads[0].comments), ["t1 c1", "t1 c2", "t1 c3"]);
    assert_eq!(bodies(&threads[1].comments), ["t2 c1", "t2 c2", "t2 c3"]);

    assert!(list_threads(&pool, f.carol.id, f.app.id).await.is_empty());
    assert!(list_threads(&pool, f.alice.id, f.empty_app.id)
        .await
        .is_empty());
});

do_sqlx_test!(pg_update_only_changes_resolved, |pool: sqlx::PgPool| async move {
    let f = fixture(&pool).await;
    let thread = create_thread(&pool, f.alice.id, new_thread(f.app.id, &["hi"])).await;
    let mut conn = pool.acquire().await.expect("getting connection");

    let res = service::update_thread(
        &mut db::PostgresDb {
            conn: &mut conn,
            user: f.alice.id,
        },
        thread.id,
        EditThread {
            resolved: Some(true),
            ..EditThread::default()
        },
    )
    .await;
    assert!(matches!(
        res,
        Err(Error::Api(ApiError::NotFound {
            kind: ResourceKind::Thread,
            ..
        }))
    ));

    let edit = EditThread {
        application_id: Some(f.empty_app.id),
        resolved: Some(true),
        comments: Some(vec![NewComment::new(String::from("injected"))]),
    };
    let mut bob = db::PostgresDb {
        conn: &mut conn,
        user: f.bob.id,
    };
    let updated = service::update_thread(&mut bob, thread.id, edit)
        .await
        .expect("resolving thread");
    assert!(updated.resolved);
    assert_eq!(updated.application_id, f.app.id);
    assert_eq!(updated.policies, thread.policies);

    // no resolved flag leaves it untouched
    let updated = service::update_thread(&mut bob, thread.id, EditThread::default())
        .await
        .expect("updating thread");
    assert!(updated.resolved);
    drop(conn);

    let listed = list_threads(&pool, f.bob.id, f.app.id).await;
    assert_eq!(listed.len(), 1);
    assert!(listed[0].resolved);
    assert_eq!(bodies(&listed[0].comments), ["hi"]);
    assert!(list_threads(&pool, f.bob.id, f.empty_app.id)
        .await
        .is_empty());
});

do_sqlx_test!(pg_forbidden_lookups_look_missing, |pool: sqlx::PgPool| async move {
    let f = fixture(&pool).await;
    let thread = create_thread(&pool, f.alice.id, new_thread(f.app.id, &[])).await;
    let mut conn = pool.acquire().await.expect("getting connection");

    for (user, id) in [
        (f.carol.id, thread.id),
        (f.bob.id, thread.id),
        (f.alice.id, ThreadId(Uuid::new_v4())),
    ] {
        let res = service::create_comment(
            &mut db::PostgresDb {
                conn: &mut conn,
                user,
            },
            id,
            NewComment::new(String::from("hello")),
        )
        .await;
        match res {
            Err(Error::Api(ApiError::NotFound { kind, id: got })) => {
                assert_eq!(kind, ResourceKind::Thread);
                assert_eq!(got, id.0.to_string());
            }
            r => panic!("unexpected result {r:?}"),
        }
    }

    for user in [f.bob.id, f.carol.id] {
        let res = service::create_thread(
            &mut db::PostgresDb {
                conn: &mut conn,
                user,
            },
            new_thread(f.app.id, &["hi"]),
        )
        .await;
        assert!(matches!(
            res,
            Err(Error::Api(ApiError::NotFound {
                kind: ResourceKind::Application,
                ..
            }))
        ));
    }
    drop(conn);

    let listed = list_threads(&pool, f.alice.id, f.app.id).await;
    assert_eq!(listed.len(), 1);
    assert!(listed[0].comments.is_empty());
});

async fn send(
    app: &axum::Router,
    method: http::Method,
    uri: &str,
    token: Option<Uuid>,
    body: String,
) -> (http::StatusCode, hyper::body::Bytes) {
    let mut req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(http::header::AUTHORIZATION, format!("bearer {token}"));
    }
    let req = req
        .body(axum::body::Body::from(body))
        .expect("building request");
    let resp = app.clone().oneshot(req).await.expect("calling router");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("reading response body");
    (status, body)
}

fn payload<T: for<'de> serde::Deserialize<'de>>(body: &[u8]) -> T {
    serde_json::from_slice::<Envelope<T>>(body)
        .expect("parsing envelope")
        .into_result()
        .expect("envelope carries an error")
}

do_sqlx_test!(pg_routes_answer_with_envelopes, |pool: sqlx::PgPool| async move {
    let admin = Uuid::new_v4();
    let app = crate::app(AppState {
        db: PgPool::new(pool),
        admin_token: Some(AuthToken(admin)),
    });

    let user = NewUser::new(
        UserId(Uuid::new_v4()),
        String::from("alice"),
        String::from("hunter2"),
    );
    let (status, _) = send(
        &app,
        http::Method::POST,
        "/api/admin/create-user",
        Some(admin),
        serde_json::to_string(&user).unwrap(),
    )
    .await;
    assert_eq!(status, http::StatusCode::OK);

    let new_app = NewApplication {
        id: ApplicationId(Uuid::new_v4()),
        name: String::from("app1"),
        policies: PolicySet::new()
            .with(Permission::ReadApplication, [user.id])
            .with(Permission::CommentOnApplication, [user.id]),
    };
    let (status, body) = send(
        &app,
        http::Method::POST,
        "/api/admin/create-application",
        Some(admin),
        serde_json::to_string(&new_app).unwrap(),
    )
    .await;
    assert_eq!(status, http::StatusCode::CREATED);
    let application: Application = payload(&body);
    assert_eq!(application.id, new_app.id);

    let session = NewSession {
        user: String::from("alice"),
        password: String::from("hunter2"),
        device: String::from("test"),
    };
    let (status, body) = send(
        &app,
        http::Method::POST,
        "/api/auth",
        None,
        serde_json::to_string(&session).unwrap(),
    )
    .await;
    assert_eq!(status, http::StatusCode::OK);
    let token: AuthToken = serde_json::from_slice(&body).unwrap();
    let token = Some(token.0);

    let (status, body) = send(&app, http::Method::GET, "/api/whoami", token, String::new()).await;
    assert_eq!(status, http::StatusCode::OK);
    let me: User = serde_json::from_slice(&body).unwrap();
    assert_eq!(me.id, user.id);

    let (status, body) = send(
        &app,
        http::Method::POST,
        "/api/comments/threads",
        token,
        serde_json::json!({
            "applicationId": new_app.id,
            "comments": [{ "body": "hi" }],
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, http::StatusCode::CREATED);
    let thread: CommentThread = payload(&body);
    assert_eq!(thread.comments[0].author_name, "alice");

    // malformed requests still get an envelope
    let tid = thread.id.0;
    for (method, uri, body) in [
        (http::Method::POST, String::from("/api/comments"), r#"{"body":"x"}"#),
        (
            http::Method::POST,
            format!("/api/comments?threadId={tid}"),
            r#"{"nobody":1}"#,
        ),
        (
            http::Method::POST,
            format!("/api/comments?threadId={tid}"),
            "not json",
        ),
        (
            http::Method::PUT,
            String::from("/api/comments/threads/not-a-uuid"),
            "{}",
        ),
        (http::Method::GET, String::from("/api/comments/threads"), ""),
    ] {
        let (status, resp) = send(&app, method.clone(), &uri, token, String::from(body)).await;
        assert_eq!(status, http::StatusCode::BAD_REQUEST, "{method} {uri}");
        let env: Envelope<serde_json::Value> =
            serde_json::from_slice(&resp).expect("parsing envelope");
        assert_eq!(env.status, 400, "{method} {uri}");
        assert!(
            matches!(env.into_result(), Err(ApiError::InvalidRequest(_))),
            "{method} {uri}"
        );
    }

    let (status, body) = send(
        &app,
        http::Method::GET,
        &format!("/api/comments/threads?applicationId={}", new_app.id.0),
        token,
        String::new(),
    )
    .await;
    assert_eq!(status, http::StatusCode::OK);
    let threads: Vec<CommentThread> = payload(&body);
    assert_eq!(threads, vec![thread]);

    let (status, _) = send(&app, http::Method::POST, "/api/unauth", token, String::new()).await;
    assert_eq!(status, http::StatusCode::OK);
    let (status, body) = send(&app, http::Method::GET, "/api/whoami", token, String::new()).await;
    assert_eq!(status, http::StatusCode::FORBIDDEN);
    assert_eq!(ApiError::parse(&body).unwrap(), ApiError::PermissionDenied);
});

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateThread {
        user: u8,
        comments: Vec<String>,
        forged: Option<u8>,
    },
    Comment {
        user: u8,
        thread: u8,
        body: String,
        forged: bool,
    },
    Update {
        user: u8,
        thread: u8,
        resolved: Option<bool>,
    },
    List {
        user: u8,
    },
}

/// Fields that do not depend on which backend assigned ids and dates
#[derive(Debug, PartialEq)]
struct CommentView {
    author_name: String,
    body: String,
    policies: PolicySet,
}

#[derive(Debug, PartialEq)]
struct ThreadView {
    application_id: ApplicationId,
    resolved: bool,
    policies: PolicySet,
    comments: Vec<CommentView>,
}

fn comment_view(c: Comment) -> CommentView {
    CommentView {
        author_name: c.author_name,
        body: c.body,
        policies: c.policies,
    }
}

fn thread_view(t: CommentThread) -> ThreadView {
    ThreadView {
        application_id: t.application_id,
        resolved: t.resolved,
        policies: t.policies,
        comments: t.comments.into_iter().map(comment_view).collect(),
    }
}

fn comparable<T>(res: Result<T, Error>) -> Result<T, ApiError> {
    res.map_err(|e| match e {
        Error::Api(ApiError::NotFound { kind, .. }) => ApiError::NotFound {
            kind,
            id: String::new(),
        },
        Error::Api(e) => e,
        Error::Anyhow(e) => panic!("internal error: {e:?}"),
    })
}

fn compare<T>(name: &str, app_res: Result<T, Error>, mock_res: Result<T, Error>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        comparable(app_res),
        comparable(mock_res),
        "app and mock did not return the same result for {name}"
    );
}

fn forge(c: &mut NewComment) {
    c.author_name = Some(String::from("mallory"));
}

struct ComparativeFuzzer {
    pool: sqlx::PgPool,
    mock: MockServer,
    /// alice, bob, carol, and a user whose account does not exist
    users: Vec<UserId>,
    app: ApplicationId,
    /// (postgres id, mock id) of every thread created so far
    threads: Vec<(ThreadId, ThreadId)>,
}

impl ComparativeFuzzer {
    async fn new(pool: sqlx::PgPool) -> ComparativeFuzzer {
        let mut mock = MockServer::new();
        let mut conn = pool.acquire().await.expect("getting seed connection");
        let mut users = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let u = new_user(name);
            users.push(u.id);
            compare(
                "CreateUser",
                db::create_user(&mut conn, u.clone()).await,
                mock.admin_create_user(u)
                    .map(|_| ())
                    .map_err(Error::Api),
            );
        }
        users.push(UserId(Uuid::new_v4()));
        let a = NewApplication {
            id: ApplicationId(Uuid::new_v4()),
            name: String::from("app1"),
            policies: PolicySet::new()
                .with(Permission::ReadApplication, [users[0], users[1]])
                .with(Permission::CommentOnApplication, [users[0]])
                .with(Permission::ManageApplication, [users[1]]),
        };
        compare(
            "CreateApplication",
            db::create_application(&mut conn, a.clone()).await,
            mock.admin_create_application(a.clone()).map_err(Error::Api),
        );
        drop(conn);
        ComparativeFuzzer {
            pool,
            mock,
            users,
            app: a.id,
            threads: Vec::new(),
        }
    }

    fn user(&self, idx: u8) -> UserId {
        self.users[usize::from(idx) % self.users.len()]
    }

    /// One past the known threads stands for a thread that does not exist
    fn thread(&self, idx: u8) -> (ThreadId, ThreadId) {
        match self.threads.get(usize::from(idx) % (self.threads.len() + 1)) {
            Some(&ids) => ids,
            None => {
                let missing = ThreadId(Uuid::new_v4());
                (missing, missing)
            }
        }
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        let mut conn = self.pool.acquire().await.expect("getting connection");
        match op {
            FuzzOp::CreateThread {
                user,
                comments,
                forged,
            } => {
                let user = self.user(user);
                let mut t = NewThread {
                    application_id: self.app,
                    comments: comments.into_iter().take(4).map(NewComment::new).collect(),
                };
                if let Some(f) = forged {
                    if !t.comments.is_empty() {
                        let i = usize::from(f) % t.comments.len();
                        forge(&mut t.comments[i]);
                    }
                }
                let app_res = service::create_thread(
                    &mut db::PostgresDb {
                        conn: &mut conn,
                        user,
                    },
                    t.clone(),
                )
                .await;
                let mock_res = service::create_thread(&mut self.mock.db_for(user), t).await;
                if let (Ok(a), Ok(m)) = (&app_res, &mock_res) {
                    self.threads.push((a.id, m.id));
                }
                compare(
                    "CreateThread",
                    app_res.map(thread_view),
                    mock_res.map(thread_view),
                );
            }
            FuzzOp::Comment {
                user,
                thread,
                body,
                forged,
            } => {
                let user = self.user(user);
                let (app_thread, mock_thread) = self.thread(thread);
                let mut c = NewComment::new(body);
                if forged {
                    forge(&mut c);
                }
                let app_res = service::create_comment(
                    &mut db::PostgresDb {
                        conn: &mut conn,
                        user,
                    },
                    app_thread,
                    c.clone(),
                )
                .await;
                let mock_res =
                    service::create_comment(&mut self.mock.db_for(user), mock_thread, c).await;
                if let Ok(a) = &app_res {
                    assert_eq!(a.thread_id, app_thread);
                }
                compare(
                    "Comment",
                    app_res.map(comment_view),
                    mock_res.map(comment_view),
                );
            }
            FuzzOp::Update {
                user,
                thread,
                resolved,
            } => {
                let user = self.user(user);
                let (app_thread, mock_thread) = self.thread(thread);
                let edit = EditThread {
                    resolved,
                    ..EditThread::default()
                };
                let app_res = service::update_thread(
                    &mut db::PostgresDb {
                        conn: &mut conn,
                        user,
                    },
                    app_thread,
                    edit.clone(),
                )
                .await;
                let mock_res =
                    service::update_thread(&mut self.mock.db_for(user), mock_thread, edit).await;
                compare(
                    "Update",
                    app_res.map(thread_view),
                    mock_res.map(thread_view),
                );
            }
            FuzzOp::List { user } => {
                let user = self.user(user);
                let app_res = service::threads_for_application(
                    &mut db::PostgresDb {
                        conn: &mut conn,
                        user,
                    },
                    self.app,
                )
                .await;
                let mock_res =
                    service::threads_for_application(&mut self.mock.db_for(user), self.app).await;
                let views = |r: Result<Vec<CommentThread>, Error>| {
                    r.map(|ts| ts.into_iter().map(thread_view).collect::<Vec<_>>())
                };
                compare("List", views(app_res), views(mock_res));
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    Vec<FuzzOp>,
    |pool: sqlx::PgPool, ops: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool).await;
        for op in ops.into_iter().take(16) {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
