use anyhow::{anyhow, Context};
use remarks_api::{
    Application, ApplicationId, AuthToken, Comment, CommentThread, EditThread, Envelope,
    NewApplication, NewComment, NewSession, NewThread, NewUser, Permission, PolicySet, UserId,
    Uuid,
};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user (admin)
    CreateUser {
        /// Username
        name: String,

        /// Initial password
        initial_password: String,
    },

    /// Register an application comments can be attached to (admin)
    CreateApplication {
        name: String,

        /// Users allowed to read the application
        #[structopt(long)]
        reader: Vec<Uuid>,

        /// Users allowed to open threads and comment
        #[structopt(long)]
        commenter: Vec<Uuid>,

        /// Users allowed to manage the application and resolve its threads
        #[structopt(long)]
        manager: Vec<Uuid>,
    },

    /// Open a session and print its token
    Login {
        user: String,
        password: String,

        #[structopt(long, default_value = "remarks-ctl")]
        device: String,
    },

    /// Start a thread on an application, with its first comments
    NewThread {
        application: Uuid,
        comments: Vec<String>,
    },

    /// Add a comment to a thread
    Comment { thread: Uuid, body: String },

    /// List the threads of an application with their comments
    ListThreads { application: Uuid },

    /// Mark a thread as resolved, or as unresolved with --reopen
    Resolve {
        thread: Uuid,

        #[structopt(long)]
        reopen: bool,
    },
}

fn token_from_env(var: &str) -> anyhow::Result<AuthToken> {
    let tok = std::env::var(var).with_context(|| format!("retrieving {var} environment variable"))?;
    let tok = Uuid::try_parse(&tok).with_context(|| format!("parsing {var} as an auth token"))?;
    Ok(AuthToken(tok))
}

fn admin_token() -> anyhow::Result<AuthToken> {
    token_from_env("ADMIN_TOKEN")
}

fn user_token() -> anyhow::Result<AuthToken> {
    token_from_env("REMARKS_TOKEN")
}

async fn unwrap_envelope<T>(resp: reqwest::Response) -> anyhow::Result<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = resp.status();
    let env = resp
        .json::<Envelope<T>>()
        .await
        .with_context(|| format!("parsing response envelope (http status {status})"))?;
    env.into_result().map_err(|e| anyhow!("server refused the request: {e}"))
}

fn print_comment(c: &Comment) {
    println!("  [{}] {}: {}", c.created_at.format("%F %T"), c.author_name, c.body);
}

fn print_thread(t: &CommentThread) {
    println!(
        "thread {} ({})",
        t.id.0,
        if t.resolved { "resolved" } else { "open" }
    );
    for c in &t.comments {
        print_comment(c);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();

    match opt.cmd {
        Command::CreateUser {
            name,
            initial_password,
        } => {
            client
                .post(format!("{}/api/admin/create-user", opt.host))
                .json(&NewUser::new(UserId(Uuid::new_v4()), name, initial_password))
                .bearer_auth(admin_token()?.0)
                .send()
                .await?
                .error_for_status()?;
        }
        Command::CreateApplication {
            name,
            reader,
            commenter,
            manager,
        } => {
            let policies = PolicySet::new()
                .with(Permission::ReadApplication, reader.into_iter().map(UserId))
                .with(
                    Permission::CommentOnApplication,
                    commenter.into_iter().map(UserId),
                )
                .with(Permission::ManageApplication, manager.into_iter().map(UserId));
            let resp = client
                .post(format!("{}/api/admin/create-application", opt.host))
                .json(&NewApplication {
                    id: ApplicationId(Uuid::new_v4()),
                    name,
                    policies,
                })
                .bearer_auth(admin_token()?.0)
                .send()
                .await?;
            let app: Application = unwrap_envelope(resp).await?;
            println!("{}", app.id.0);
        }
        Command::Login {
            user,
            password,
            device,
        } => {
            let token: AuthToken = client
                .post(format!("{}/api/auth", opt.host))
                .json(&NewSession {
                    user,
                    password,
                    device,
                })
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", token.0);
        }
        Command::NewThread {
            application,
            comments,
        } => {
            let resp = client
                .post(format!("{}/api/comments/threads", opt.host))
                .json(&NewThread {
                    application_id: ApplicationId(application),
                    comments: comments.into_iter().map(NewComment::new).collect(),
                })
                .bearer_auth(user_token()?.0)
                .send()
                .await?;
            print_thread(&unwrap_envelope(resp).await?);
        }
        Command::Comment { thread, body } => {
            let resp = client
                .post(format!("{}/api/comments", opt.host))
                .query(&[("threadId", thread)])
                .json(&NewComment::new(body))
                .bearer_auth(user_token()?.0)
                .send()
                .await?;
            print_comment(&unwrap_envelope(resp).await?);
        }
        Command::ListThreads { application } => {
            let resp = client
                .get(format!("{}/api/comments/threads", opt.host))
                .query(&[("applicationId", application)])
                .bearer_auth(user_token()?.0)
                .send()
                .await?;
            let threads: Vec<CommentThread> = unwrap_envelope(resp).await?;
            for t in &threads {
                print_thread(t);
            }
        }
        Command::Resolve { thread, reopen } => {
            let resp = client
                .put(format!("{}/api/comments/threads/{}", opt.host, thread))
                .json(&EditThread {
                    resolved: Some(!reopen),
                    ..EditThread::default()
                })
                .bearer_auth(user_token()?.0)
                .send()
                .await?;
            print_thread(&unwrap_envelope(resp).await?);
        }
    }

    Ok(())
}
