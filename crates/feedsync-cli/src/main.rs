//! Feedsync CLI
//!
//! Thin wrapper around feedsync-core for command-line usage. Every session
//! runs against the in-memory services.
//!
//! ## Usage
//!
//! ```bash
//! # Show version and effective configuration
//! feedsync info
//!
//! # Generate a stored name for an upload
//! feedsync name cat.png --namespace images
//!
//! # Check whether a form could be submitted
//! feedsync validate login --email ann@example.com --password secret1
//! feedsync validate register --username ann --email ann@example.com --password secret1 --avatar me.png
//!
//! # Upload a file and print its URL
//! feedsync upload ./cat.png
//!
//! # Run a scripted session and print the resulting feed
//! feedsync simulate --user ann --post "hello" --post "look" --image ./cat.png --comment "nice"
//!
//! # Record every event as JSONL
//! feedsync --log-file session.jsonl -vv simulate --post "hello"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use feedsync_core::logging::JsonlLayer;
use feedsync_core::media::{object_path, stored_name};
use feedsync_core::{
    CommentDraft, FeedClient, FeedConfig, FeedError, LoginForm, MediaFile, MediaNamespace, Post,
    PostDraft, RegistrationForm, SessionState, Snapshot, SnapshotReceiver, MIN_PASSWORD_LEN,
};
use feedsync_core::sync::Document;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Password of the account `simulate` signs in with
const SIMULATED_PASSWORD: &str = "feedsync-simulated";

/// How long `simulate` waits for the feed to settle
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Feedsync - live feed client core
#[derive(Parser)]
#[command(name = "feedsync")]
#[command(version = "0.1.0")]
#[command(about = "Feedsync - live feed synchronization and media upload")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Append every log event to this JSONL file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version and effective configuration
    Info,

    /// Generate a collision-resistant stored name
    Name {
        /// Original file name
        original: String,

        /// Print the full object path in this namespace
        #[arg(short, long)]
        namespace: Option<Namespace>,
    },

    /// Check whether a form is submittable
    Validate {
        #[command(subcommand)]
        form: ValidateForm,
    },

    /// Upload a file to the in-memory object store
    Upload {
        /// File to upload
        file: PathBuf,

        #[arg(short, long, value_enum, default_value = "images")]
        namespace: Namespace,
    },

    /// Run a scripted session and print the resulting feed
    Simulate {
        /// Display name of the simulated user
        #[arg(short, long, default_value = "ann")]
        user: String,

        /// Post text (repeatable, posted in order)
        #[arg(short, long = "post")]
        posts: Vec<String>,

        /// Image attached to the first post
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Comment on the newest post (repeatable)
        #[arg(long = "comment")]
        comments: Vec<String>,

        /// Make the first image upload fail
        #[arg(long)]
        fail_upload: bool,

        /// Make the first post's write be rejected by the store
        #[arg(long)]
        fail_write: bool,
    },
}

#[derive(Subcommand)]
enum ValidateForm {
    /// Email/password sign-in
    Login {
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    /// Account creation
    Register {
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        password: String,
        /// Avatar image file
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Namespace {
    Images,
    Avatars,
}

impl From<Namespace> for MediaNamespace {
    fn from(namespace: Namespace) -> Self {
        match namespace {
            Namespace::Images => MediaNamespace::Images,
            Namespace::Avatars => MediaNamespace::Avatars,
        }
    }
}

fn setup_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let jsonl = log_file
        .map(JsonlLayer::create)
        .transpose()
        .context("Failed to open log file")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(jsonl)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FeedConfig> {
    match path {
        Some(path) => FeedConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(FeedConfig::default()),
    }
}

/// Print the verdict of a form check, failing if it is not submittable
fn report_validation(form: &str, submittable: bool, problems: Vec<&str>) -> Result<()> {
    if submittable {
        println!("{} form: submittable", form);
        return Ok(());
    }
    println!("{} form: not submittable", form);
    for problem in &problems {
        println!("  - {}", problem);
    }
    bail!("{} form is incomplete", form)
}

fn password_problem(password: &str) -> Option<&'static str> {
    (password.chars().count() < MIN_PASSWORD_LEN).then_some("password is too short")
}

async fn wait_signed_in(session: &SessionState) -> Result<()> {
    let mut rx = session.subscribe();
    tokio::time::timeout(SETTLE_TIMEOUT, rx.wait_for(|identity| identity.is_some()))
        .await
        .context("Timed out waiting for sign-in")?
        .map_err(|_| anyhow!("Session closed"))?;
    Ok(())
}

/// Wait for a snapshot with `count` documents, none of them pending
async fn settle<D: Document>(
    rx: &mut SnapshotReceiver<D>,
    count: usize,
) -> Result<Snapshot<D>> {
    let wait = async {
        while let Some(snapshot) = rx.recv().await {
            if snapshot.len() == count && snapshot.iter().all(|d| !d.created_at().is_pending()) {
                return Some(snapshot);
            }
        }
        None
    };
    tokio::time::timeout(SETTLE_TIMEOUT, wait)
        .await
        .context("Timed out waiting for the feed to settle")?
        .ok_or_else(|| anyhow!("Live query ended before the feed settled"))
}

fn print_post(post: &Post) {
    print!("  [{}] {}: {}", post.created_at, post.author_name, post.text);
    if post.has_image() {
        print!(" (image: {})", post.image_url);
    }
    println!();
}

#[allow(clippy::too_many_arguments)]
async fn simulate(
    config: FeedConfig,
    user: String,
    posts: Vec<String>,
    image: Option<PathBuf>,
    comments: Vec<String>,
    fail_upload: bool,
    fail_write: bool,
) -> Result<()> {
    let (client, backends) = FeedClient::in_memory(config);
    let email = format!("{}@feedsync.local", user.to_lowercase());
    backends
        .identity
        .add_account(&email, SIMULATED_PASSWORD, Some(user.as_str()), None);

    let observer = client.observe_identity();
    client
        .identity()
        .sign_in(&LoginForm::new(email.as_str(), SIMULATED_PASSWORD))
        .await?;
    wait_signed_in(client.session()).await?;
    info!(%user, "Simulated user signed in");
    println!("Signed in as {}", user);

    let mut feed = client.feed_view();
    feed.open().await?;
    let mut snapshots = feed
        .snapshots()
        .ok_or_else(|| anyhow!("Feed is not open"))?;

    let image = image.as_deref().map(MediaFile::load).transpose()?;
    if fail_upload {
        backends.objects.fail_next_transfer("simulated transfer failure");
    }

    let mut published = 0;
    for (i, text) in posts.iter().enumerate() {
        let mut draft = PostDraft::new(text.as_str());
        if i == 0 {
            draft.image = image.clone();
            if fail_write {
                backends.documents.fail_next_append("simulated write rejection");
            }
        }

        match client.composer().submit_post(&mut draft).await {
            Ok(pending) => match pending.acknowledged().await {
                Ok(id) => {
                    published += 1;
                    println!("Posted {}", id);
                }
                Err(e) => {
                    warn!(error = %e, "Simulated post was not written");
                    println!("Write failed: {}", e);
                }
            },
            Err(e @ (FeedError::Upload(_) | FeedError::UploadRejected(_))) => {
                warn!(error = %e, "Simulated post was not submitted");
                println!("Post not submitted: {} (draft kept: {:?})", e, draft.text);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let snapshot = settle(&mut snapshots, published).await?;
    println!();
    println!("Feed ({} posts):", snapshot.len());
    for post in snapshot.iter() {
        print_post(post);
    }

    let newest = snapshot.items().first();
    if let Some(newest) = newest.filter(|_| !comments.is_empty()) {
        let mut thread = client.comment_thread(newest.id.clone());
        thread.open().await?;
        let mut thread_snapshots = thread
            .snapshots()
            .ok_or_else(|| anyhow!("Comment thread is not open"))?;

        for text in &comments {
            let mut draft = CommentDraft::new(text.as_str());
            if let Some(pending) = client.composer().submit_comment(&newest.id, &mut draft)? {
                pending.acknowledged().await?;
            }
        }
        let settled = settle(&mut thread_snapshots, comments.len()).await?;
        println!();
        println!("Comments on \"{}\" ({}):", newest.text, settled.len());
        for comment in settled.iter() {
            println!("  {}: {}", comment.author_name, comment.text);
        }
        thread.close();
    } else if !comments.is_empty() {
        println!("No post to comment on");
    }

    feed.close();
    observer.release();
    println!();
    println!("Open subscriptions: {}", client.sync().open_handles());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_file.as_deref())?;
    let config = load_config(cli.config.as_deref())?;
    debug!(?config, "Effective configuration");

    match cli.command {
        Commands::Info => {
            println!("Feedsync v0.1.0");
            println!();
            println!("Configuration:");
            println!("  Max image size: {} bytes", config.max_image_bytes);
            println!("  Max avatar size: {} bytes", config.max_avatar_bytes);
            println!("  Event channel capacity: {}", config.event_channel_capacity);
        }

        Commands::Name {
            original,
            namespace,
        } => {
            let name = stored_name(&original);
            match namespace {
                Some(namespace) => println!("{}", object_path(namespace.into(), &name)),
                None => println!("{}", name),
            }
        }

        Commands::Validate { form } => match form {
            ValidateForm::Login { email, password } => {
                let form = LoginForm::new(email, password);
                let mut problems = Vec::new();
                if form.email.is_empty() {
                    problems.push("email is required");
                }
                problems.extend(password_problem(&form.password));
                report_validation("Login", form.can_submit(), problems)?;
            }
            ValidateForm::Register {
                username,
                email,
                password,
                avatar,
            } => {
                let avatar = avatar.as_deref().map(MediaFile::load).transpose()?;
                let form = RegistrationForm {
                    username,
                    email,
                    password,
                    avatar,
                };
                let mut problems = Vec::new();
                if form.username.is_empty() {
                    problems.push("username is required");
                }
                if form.email.is_empty() {
                    problems.push("email is required");
                }
                if form.avatar.is_none() {
                    problems.push("avatar is required");
                }
                problems.extend(password_problem(&form.password));
                report_validation("Registration", form.can_submit(), problems)?;
            }
        },

        Commands::Upload { file, namespace } => {
            let (client, _backends) = FeedClient::in_memory(config);
            let media = MediaFile::load(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let uploaded = client.uploader().upload_file(&media, namespace.into()).await?;
            println!("Uploaded {} ({} bytes)", media.name, media.len());
            println!("  Path: {}", uploaded.path);
            println!("  URL: {}", uploaded.url);
        }

        Commands::Simulate {
            user,
            posts,
            image,
            comments,
            fail_upload,
            fail_write,
        } => {
            simulate(config, user, posts, image, comments, fail_upload, fail_write).await?;
        }
    }

    Ok(())
}
