#![cfg(test)]

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::{self, request},
    response::IntoResponse,
};
use remarks_api::{
    Application, ApplicationId, AuthToken, EditThread, Envelope, Error as ApiError,
    NewApplication, NewComment, NewThread, NewUser, Permission, PolicySet, ResourceKind, ThreadId,
    User, UserId, Uuid,
};
use remarks_mock_server::MockServer;
use std::panic::AssertUnwindSafe;
use tower::ServiceExt;

use crate::{extractors::*, handlers::ThreadParam, service, Error};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn parts_with_auth(header: &str) -> Option<request::Parts> {
    http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, header)
        .body(())
        .ok()
        .map(|r| r.into_parts().0)
}

do_tokio_test!(fuzz_preauth_extractor, String, |token: String| async move {
    if let Some(mut req) = parts_with_auth(&token) {
        match PreAuth::from_request_parts(&mut req, &()).await {
            Ok(_) => (),
            Err(Error::Api(ApiError::PermissionDenied)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

#[tokio::test]
async fn preauth_accepts_only_bearer_uuids() {
    let token = Uuid::new_v4();
    for (header, accepted) in [
        (format!("Bearer {token}"), true),
        (format!("bearer {token}"), true),
        (format!("Basic {token}"), false),
        (format!("Bearer {token} extra"), false),
        (String::from("Bearer not-a-uuid"), false),
        (String::from("Bearer"), false),
    ] {
        let mut req = parts_with_auth(&header).expect("building request");
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(PreAuth(t)) => {
                assert!(accepted, "{header:?} should have been refused");
                assert_eq!(t.0, token);
            }
            Err(Error::Api(ApiError::PermissionDenied)) => {
                assert!(!accepted, "{header:?} should have been accepted")
            }
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
    let mut req = http::Request::builder()
        .uri("/")
        .body(())
        .expect("building request")
        .into_parts()
        .0;
    assert!(matches!(
        PreAuth::from_request_parts(&mut req, &()).await,
        Err(Error::Api(ApiError::PermissionDenied))
    ));
}

#[tokio::test]
async fn errors_are_wrapped_in_envelopes() {
    let thread = Uuid::new_v4();
    let resp = Error::not_found(ResourceKind::Thread, thread).into_response();
    assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("reading response body");
    let env: Envelope<serde_json::Value> =
        serde_json::from_slice(&body).expect("parsing envelope");
    assert_eq!(env.status, 404);
    assert_eq!(env.payload, None);
    assert_eq!(
        env.into_result(),
        Err(ApiError::NotFound {
            kind: ResourceKind::Thread,
            id: thread.to_string(),
        })
    );

    let resp = Error::Anyhow(anyhow::anyhow!("disk on fire")).into_response();
    assert_eq!(resp.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("reading response body");
    assert!(matches!(ApiError::parse(&body), Ok(ApiError::Unknown(_))));
}

async fn invalid_request(err: Error) -> ApiError {
    let resp = err.into_response();
    assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("reading response body");
    ApiError::parse(&body).expect("parsing error envelope")
}

#[tokio::test]
async fn malformed_inputs_are_reported_in_envelopes() {
    for uri in ["/api/comments", "/api/comments?threadId=nope"] {
        let mut req = http::Request::builder()
            .uri(uri)
            .body(())
            .expect("building request")
            .into_parts()
            .0;
        let err = match ApiQuery::<ThreadParam>::from_request_parts(&mut req, &()).await {
            Ok(_) => panic!("{uri} should have been refused"),
            Err(e) => e,
        };
        assert!(matches!(
            invalid_request(err).await,
            ApiError::InvalidRequest(_)
        ));
    }

    for body in ["not json", r#"{"nobody":1}"#] {
        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri("/api/comments")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .expect("building request");
        let err = match ApiJson::<NewComment>::from_request(req, &()).await {
            Ok(_) => panic!("{body:?} should have been refused"),
            Err(e) => e,
        };
        assert!(matches!(
            invalid_request(err).await,
            ApiError::InvalidRequest(_)
        ));
    }
}

/// State whose pool only connects when a handler actually needs the database
fn lazy_state(admin_token: Option<AuthToken>) -> AppState {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgresql://localhost/remarks-unused")
        .expect("building lazy pool");
    AppState {
        db: PgPool::new(pool),
        admin_token,
    }
}

async fn call(
    app: &axum::Router,
    method: http::Method,
    uri: &str,
    auth: Option<String>,
) -> (http::StatusCode, Result<ApiError, String>) {
    let mut req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        req = req.header(http::header::AUTHORIZATION, auth);
    }
    let req = req
        .body(axum::body::Body::from("{}"))
        .expect("building request");
    let resp = app.clone().oneshot(req).await.expect("calling router");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("reading response body");
    (status, ApiError::parse(&body).map_err(|e| format!("{e:#}")))
}

#[tokio::test]
async fn comment_routes_require_a_session() {
    let app = crate::app(lazy_state(None));
    let id = Uuid::new_v4();
    for (method, uri) in [
        (http::Method::POST, format!("/api/comments?threadId={id}")),
        (http::Method::POST, String::from("/api/comments/threads")),
        (
            http::Method::GET,
            format!("/api/comments/threads?applicationId={id}"),
        ),
        (http::Method::PUT, format!("/api/comments/threads/{id}")),
    ] {
        for auth in [None, Some(String::from("Basic dXNlcjpwYXNz"))] {
            let (status, err) = call(&app, method.clone(), &uri, auth).await;
            assert_eq!(status, http::StatusCode::FORBIDDEN, "{method} {uri}");
            assert_eq!(err, Ok(ApiError::PermissionDenied), "{method} {uri}");
        }
    }
}

#[tokio::test]
async fn admin_routes_check_the_admin_token() {
    let admin = AuthToken(Uuid::new_v4());
    let other = format!("Bearer {}", Uuid::new_v4());
    for (state, auth) in [
        (lazy_state(None), other.clone()),
        (lazy_state(Some(admin)), other),
    ] {
        let app = crate::app(state);
        for uri in ["/api/admin/create-user", "/api/admin/create-application"] {
            let (status, err) = call(&app, http::Method::POST, uri, Some(auth.clone())).await;
            assert_eq!(status, http::StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(err, Ok(ApiError::PermissionDenied), "{uri}");
        }
    }
}

struct Fixture {
    server: MockServer,
    alice: User,
    bob: User,
    carol: User,
    app: Application,
}

fn user(server: &mut MockServer, name: &str) -> User {
    server
        .admin_create_user(NewUser {
            id: UserId(Uuid::new_v4()),
            name: String::from(name),
            initial_password_hash: String::from("unused"),
        })
        .expect("creating user")
}

/// alice can comment on the app, bob can only read it and manage it, carol has no access
fn fixture() -> Fixture {
    let mut server = MockServer::new();
    let alice = user(&mut server, "alice");
    let bob = user(&mut server, "bob");
    let carol = user(&mut server, "carol");
    let app = server
        .admin_create_application(NewApplication {
            id: ApplicationId(Uuid::new_v4()),
            name: String::from("app1"),
            policies: PolicySet::new()
                .with(Permission::ReadApplication, [alice.id, bob.id])
                .with(Permission::CommentOnApplication, [alice.id])
                .with(Permission::ManageApplication, [bob.id]),
        })
        .expect("creating application");
    Fixture {
        server,
        alice,
        bob,
        carol,
        app,
    }
}

fn comments(texts: &[&str]) -> Vec<NewComment> {
    texts.iter().map(|t| NewComment::new(String::from(*t))).collect()
}

fn new_thread(app: ApplicationId, texts: &[&str]) -> NewThread {
    NewThread {
        application_id: app,
        comments: comments(texts),
    }
}

#[tokio::test]
async fn create_thread_with_one_comment() {
    let mut f = fixture();
    let thread = service::create_thread(
        &mut f.server.db_for(f.alice.id),
        new_thread(f.app.id, &["hi"]),
    )
    .await
    .expect("creating thread");

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
    assert_eq!(c.author_name, f.alice.name);
    assert_eq!(c.thread_id, thread.id);
    assert_eq!(c.body, "hi");
    assert_eq!(
        c.policies,
        thread
            .policies
            .child_policies(ResourceKind::Thread, ResourceKind::Comment)
    );

    assert_eq!(f.server.threads().len(), 1);
    assert_eq!(f.server.comments(), &thread.comments[..]);
}

#[tokio::test]
async fn author_name_comes_from_the_session() {
    let mut f = fixture();
    let thread = service::create_thread(&mut f.server.db_for(f.alice.id), new_thread(f.app.id, &[]))
        .await
        .expect("creating thread");
    let comment = service::create_comment(
        &mut f.server.db_for(f.alice.id),
        thread.id,
        NewComment {
            body: String::from("hello"),
            author_name: Some(String::from("   ")),
        },
    )
    .await
    .expect("creating comment");
    assert_eq!(comment.author_name, "alice");
}

#[tokio::test]
async fn submitted_author_name_is_refused() {
    let mut f = fixture();
    let thread = service::create_thread(&mut f.server.db_for(f.alice.id), new_thread(f.app.id, &[]))
        .await
        .expect("creating thread");
    let res = service::create_comment(
        &mut f.server.db_for(f.alice.id),
        thread.id,
        NewComment {
            body: String::from("hello"),
            author_name: Some(String::from("mallory")),
        },
    )
    .await;
    assert!(matches!(
        res,
        Err(Error::Api(ApiError::AuthorNameNotAllowed(n))) if n == "mallory"
    ));
    assert!(f.server.comments().is_empty());
}

#[tokio::test]
async fn thread_with_a_forged_author_writes_nothing() {
    let mut f = fixture();
    let mut t = new_thread(f.app.id, &["one", "two"]);
    t.comments[1].author_name = Some(String::from("mallory"));
    let res = service::create_thread(&mut f.server.db_for(f.alice.id), t).await;
    assert!(matches!(
        res,
        Err(Error::Api(ApiError::AuthorNameNotAllowed(_)))
    ));
    assert!(f.server.threads().is_empty());
    assert!(f.server.comments().is_empty());
}

#[tokio::test]
async fn comment_on_missing_or_forbidden_thread() {
    let mut f = fixture();
    let missing = ThreadId(Uuid::new_v4());
    let res = service::create_comment(
        &mut f.server.db_for(f.alice.id),
        missing,
        NewComment::new(String::from("hello")),
    )
    .await;
    match res {
        Err(Error::Api(ApiError::NotFound { kind, id })) => {
            assert_eq!(kind, ResourceKind::Thread);
            assert_eq!(id, missing.0.to_string());
        }
        r => panic!("unexpected result {r:?}"),
    }

    // bob can read the thread but not comment on it
    let thread = service::create_thread(&mut f.server.db_for(f.alice.id), new_thread(f.app.id, &[]))
        .await
        .expect("creating thread");
    let res = service::create_comment(
        &mut f.server.db_for(f.bob.id),
        thread.id,
        NewComment::new(String::from("hello")),
    )
    .await;
    assert!(matches!(
        res,
        Err(Error::Api(ApiError::NotFound {
            kind: ResourceKind::Thread,
            ..
        }))
    ));
    assert!(f.server.comments().is_empty());
}

#[tokio::test]
async fn thread_on_forbidden_application() {
    let mut f = fixture();
    for u in [f.bob.id, f.carol.id] {
        let res =
            service::create_thread(&mut f.server.db_for(u), new_thread(f.app.id, &["hi"])).await;
        assert!(matches!(
            res,
            Err(Error::Api(ApiError::NotFound {
                kind: ResourceKind::Application,
                ..
            }))
        ));
    }
    assert!(f.server.threads().is_empty());
}

#[tokio::test]
async fn session_without_user_is_refused() {
    let mut f = fixture();
    let ghost = UserId(Uuid::new_v4());
    let app = f
        .server
        .admin_create_application(NewApplication {
            id: ApplicationId(Uuid::new_v4()),
            name: String::from("haunted"),
            policies: PolicySet::new().with(Permission::CommentOnApplication, [ghost]),
        })
        .expect("creating application");
    let res = service::create_thread(&mut f.server.db_for(ghost), new_thread(app.id, &[])).await;
    assert!(matches!(res, Err(Error::Api(ApiError::PermissionDenied))));
    assert!(f.server.threads().is_empty());
}

#[tokio::test]
async fn initial_comments_keep_submission_order() {
    let mut f = fixture();
    let texts = ["c1", "c2", "c3", "c4", "c5"];
    let thread = service::create_thread(
        &mut f.server.db_for(f.alice.id),
        new_thread(f.app.id, &texts),
    )
    .await
    .expect("creating thread");

    let bodies = thread
        .comments
        .iter()
        .map(|c| c.body.as_str())
        .collect::<Vec<_>>();
    assert_eq!(bodies, texts);
    for w in thread.comments.windows(2) {
        assert!(w[0].created_at < w[1].created_at);
    }
    assert!(thread.created_at < thread.comments[0].created_at);
}

#[tokio::test]
async fn failing_comment_leaves_earlier_writes() {
    let mut f = fixture();
    f.server.fail_comment_saves_after(2);
    let res = service::create_thread(
        &mut f.server.db_for(f.alice.id),
        new_thread(f.app.id, &["c1", "c2", "c3", "c4"]),
    )
    .await;
    assert!(matches!(res, Err(Error::Anyhow(_))));
    assert_eq!(f.server.threads().len(), 1);
    let bodies = f
        .server
        .comments()
        .iter()
        .map(|c| c.body.as_str())
        .collect::<Vec<_>>();
    assert_eq!(bodies, ["c1", "c2"]);
}

#[tokio::test]
async fn threads_are_read_back_with_their_comments() {
    let mut f = fixture();
    let t1 = service::create_thread(
        &mut f.server.db_for(f.alice.id),
        new_thread(f.app.id, &["t1 c1"]),
    )
    .await
    .expect("creating thread");
    let t2 = service::create_thread(
        &mut f.server.db_for(f.alice.id),
        new_thread(f.app.id, &["t2 c1", "t2 c2"]),
    )
    .await
    .expect("creating thread");
    // interleave later comments between the two threads
    for (t, body) in [(t1.id, "t1 c2"), (t2.id, "t2 c3"), (t1.id, "t1 c3")] {
        service::create_comment(
            &mut f.server.db_for(f.alice.id),
            t,
            NewComment::new(String::from(body)),
        )
        .await
        .expect("creating comment");
    }

    // bob only inherited read access, which is enough
    let threads = service::threads_for_application(&mut f.server.db_for(f.bob.id), f.app.id)
        .await
        .expect("listing threads");
    assert_eq!(threads.len(), 2);
    for t in &threads {
        let expected: &[&str] = if t.id == t1.id {
            &["t1 c1", "t1 c2", "t1 c3"]
        } else {
            assert_eq!(t.id, t2.id);
            &["t2 c1", "t2 c2", "t2 c3"]
        };
        let bodies = t.comments.iter().map(|c| c.body.as_str()).collect::<Vec<_>>();
        assert_eq!(bodies, expected);
        assert!(t.comments.iter().all(|c| c.thread_id == t.id));
        for w in t.comments.windows(2) {
            assert!(w[0].created_at < w[1].created_at);
        }
    }
    assert_eq!(f.server.comment_queries(), 1);

    // carol sees nothing
    let threads = service::threads_for_application(&mut f.server.db_for(f.carol.id), f.app.id)
        .await
        .expect("listing threads");
    assert!(threads.is_empty());
}

#[tokio::test]
async fn empty_application_skips_comment_query() {
    let mut f = fixture();
    let threads = service::threads_for_application(&mut f.server.db_for(f.alice.id), f.app.id)
        .await
        .expect("listing threads");
    assert!(threads.is_empty());
    assert_eq!(f.server.comment_queries(), 0);
}

#[tokio::test]
async fn update_only_changes_resolved() {
    let mut f = fixture();
    let thread = service::create_thread(
        &mut f.server.db_for(f.alice.id),
        new_thread(f.app.id, &["hi"]),
    )
    .await
    .expect("creating thread");

    let edit = EditThread {
        application_id: Some(ApplicationId(Uuid::new_v4())),
        resolved: Some(true),
        comments: Some(comments(&["injected"])),
    };
    let updated = service::update_thread(&mut f.server.db_for(f.bob.id), thread.id, edit)
        .await
        .expect("updating thread");
    assert!(updated.resolved);
    assert_eq!(updated.application_id, f.app.id);
    assert_eq!(updated.policies, thread.policies);

    let stored = &f.server.threads()[0];
    assert!(stored.resolved);
    assert_eq!(stored.application_id, f.app.id);
    assert_eq!(f.server.comments().len(), 1);
}

#[tokio::test]
async fn update_needs_manage_permission() {
    let mut f = fixture();
    let thread = service::create_thread(&mut f.server.db_for(f.alice.id), new_thread(f.app.id, &[]))
        .await
        .expect("creating thread");
    let edit = EditThread {
        resolved: Some(true),
        ..EditThread::default()
    };
    let res = service::update_thread(&mut f.server.db_for(f.alice.id), thread.id, edit).await;
    assert!(matches!(
        res,
        Err(Error::Api(ApiError::NotFound {
            kind: ResourceKind::Thread,
            ..
        }))
    ));
    assert!(!f.server.threads()[0].resolved);
}
