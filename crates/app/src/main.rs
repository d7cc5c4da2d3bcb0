use std::fmt;

use clap::{Parser, Subcommand};
use progress_core::model::{CourseId, ItemId, UserId};
use services::{AppServices, Clock, ProgressConfig};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "progress")]
#[command(about = "Track course progress and show what to study next")]
struct Cli {
    /// SQLite database url or path
    #[arg(long, global = true)]
    db: Option<String>,

    /// Act as this user instead of the anonymous learner
    #[arg(long, global = true)]
    user: Option<String>,

    /// Remote ledger base url (needs PROGRESS_REMOTE_KEY)
    #[arg(long, global = true)]
    remote_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List known courses with progress
    Courses,
    /// Show the roadmap of a course
    Status { course: String },
    /// Mark an item completed
    Complete { course: String, item: String },
    /// Forget local progress for a course
    Reset { course: String },
    /// Sign in, folding anonymous progress into the user
    Login { user: String },
    /// Remember the last visited lesson
    Visit { target: String },
    /// Open a lesson: remember it and mark it in progress
    Open { lesson: String, target: Option<String> },
    /// Move past a lesson, marking it completed
    Finish { lesson: String },
    /// Register today's visit and print the streak
    Streak,
}

#[derive(Debug)]
enum ArgsError {
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

async fn run(cli: Cli, mut config: ProgressConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(db) = &cli.db {
        config.set_db_url(db)?;
    }
    if let Some(url) = &cli.remote_url {
        config.set_remote_url(url)?;
    }
    if let Some(user) = &cli.user {
        config.user = Some(UserId::new(user)?);
    }

    prepare_sqlite_file(&config.db_url)?;
    let services = AppServices::from_config(&config, Clock::default_clock()).await?;
    let progress = services.progress();
    debug!(db = %config.db_url, scope = %progress.scope(), "services ready");

    match cli.command {
        Command::Courses => {
            let courses: Vec<CourseId> = progress
                .catalog()
                .courses()
                .map(|c| c.course_id().clone())
                .collect();
            let summaries = progress.all_courses_progress(&courses).await;
            for curriculum in progress.catalog().courses() {
                if let Some(summary) = summaries.get(curriculum.course_id()) {
                    println!(
                        "{:<24} {:>3}%  {}/{}  {}",
                        curriculum.course_id().as_str(),
                        summary.percentage,
                        summary.completed,
                        summary.total,
                        curriculum.title()
                    );
                }
            }
        }
        Command::Status { course } => {
            let course = CourseId::new(&course)?;
            let roadmap = progress.course_status(&course).await?;
            println!(
                "{course}: {}% ({}/{}) next module: {}",
                roadmap.percentage, roadmap.completed, roadmap.total, roadmap.next_module_title
            );
            for module in &roadmap.modules {
                println!("  {} [{}/{}]", module.title, module.done, module.total);
            }
            for entry in &roadmap.items {
                println!(
                    "  {:<6} {:<4} {:<10} {}",
                    entry.status.to_string(),
                    entry.item.id().as_str(),
                    entry.item.kind().as_str(),
                    entry.item.title()
                );
            }
        }
        Command::Complete { course, item } => {
            let course = CourseId::new(&course)?;
            let item = ItemId::new(&item)?;
            let record = progress.mark_completed(&course, &item).await?;
            progress.drain_remote().await;
            println!("{course}/{item} completed at {}", record.completed_at.to_rfc3339());
        }
        Command::Reset { course } => {
            let course = CourseId::new(&course)?;
            progress.reset_course(&course).await?;
            println!("{course}: progress reset");
        }
        Command::Login { user } => {
            let user = UserId::new(&user)?;
            let report = progress.sign_in(user.clone()).await;
            progress.drain_remote().await;
            info!(user = %user, clean = report.is_clean(), "signed in");
            println!(
                "signed in as {user}: {} course(s), {} record(s), {} lesson(s) adopted, {} failure(s)",
                report.courses_migrated,
                report.records_adopted,
                report.lessons_adopted,
                report.failures
            );
        }
        Command::Visit { target } => {
            progress.set_last_visited(&target).await?;
            println!("last visited: {target}");
        }
        Command::Open { lesson, target } => {
            let lesson = ItemId::new(&lesson)?;
            if let Some(target) = &target {
                progress.set_last_visited(target).await?;
            }
            let state = progress.open_lesson(&lesson).await?;
            progress.drain_remote().await;
            println!("{lesson}: {} ({}%)", state.status, state.percent);
        }
        Command::Finish { lesson } => {
            let lesson = ItemId::new(&lesson)?;
            let state = progress.finish_lesson(&lesson).await?;
            progress.drain_remote().await;
            println!("{lesson}: {} ({}%)", state.status, state.percent);
        }
        Command::Streak => {
            let streak = services.streak().touch().await;
            println!("current streak: {streak} day(s)");
        }
    }
    Ok(())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match ProgressConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli, config).await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
