use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use remarks_api::{AuthToken, Uuid};
use std::net::SocketAddr;
use structopt::StructOpt;

mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;
mod service;
mod tests;

use error::Error;
use extractors::*;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, StructOpt)]
#[structopt(name = "remarks-server", about = "Comment threads for applications")]
struct Opt {
    /// Postgres connection string
    #[structopt(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Address to listen on
    #[structopt(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Bearer token for the admin endpoints, which are disabled if unset
    #[structopt(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<Uuid>,
}

pub async fn create_sqlx_pool(db_url: &str) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(db_url)
        .await
        .context("connecting to the database")
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route(
            "/api/admin/create-application",
            post(handlers::admin_create_application),
        )
        .route("/api/auth", post(handlers::auth))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route("/api/comments", post(handlers::create_comment))
        .route(
            "/api/comments/threads",
            get(handlers::fetch_threads).post(handlers::create_thread),
        )
        .route(
            "/api/comments/threads/:thread_id",
            put(handlers::update_thread),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();
    if opt.admin_token.is_none() {
        tracing::warn!("no admin token configured, admin endpoints are disabled");
    }

    let db = create_sqlx_pool(&opt.database_url).await?;
    MIGRATOR
        .run(&db)
        .await
        .context("applying database migrations")?;

    let state = AppState {
        db: PgPool::new(db),
        admin_token: opt.admin_token.map(AuthToken),
    };

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app(state).into_make_service())
        .await
        .context("serving axum webserver")
}
