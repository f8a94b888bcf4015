use std::io::{self as std_io, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use lifehub::config::{Config, StorageConfig};
use lifehub::domains::history::{HistoryEvent, Mood};
use lifehub::domains::records::FinanceKind;
use lifehub::domains::user::UserContext;
use lifehub::error::{LifehubError, Result};
use lifehub::local_time::format_hhmm;
use lifehub::services::normalizer::format_compact_duration;
use lifehub::services::quick_log::RegexClassifier;
use lifehub::services::summary::SummaryOutcome;
use lifehub::services::tracker::{NewFinanceRecord, NewWorkout};
use lifehub::LifeHub;

#[derive(Parser, Debug)]
#[command(name = "lifehub")]
#[command(about = "Personal life-tracking hub")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    db: Option<String>,

    #[arg(long, env = "LIFEHUB_USER", default_value = "local_user")]
    user_id: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    Meal {
        #[command(subcommand)]
        command: MealCommand,
    },
    Workout {
        activity_type: String,
        #[arg(long)]
        distance_km: Option<f64>,
        #[arg(long)]
        minutes: Option<i64>,
    },
    Sleep {
        #[command(subcommand)]
        command: SleepCommand,
    },
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    Journal {
        #[command(subcommand)]
        command: JournalCommand,
    },
    Finance {
        #[command(subcommand)]
        command: FinanceCommand,
    },
    /// List private vault entries.
    Vault,
    History {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = false)]
        today: bool,
    },
    Summary {
        #[arg(long, default_value_t = false)]
        generate: bool,
    },
    /// Classify free text and record it.
    Log { text: Vec<String> },
    /// Talk to the assistant. Without a message, starts an interactive session.
    Chat { message: Vec<String> },
}

#[derive(clap::Subcommand, Debug)]
enum TaskCommand {
    Add { description: Vec<String> },
    Done { id: i64 },
    Undo { id: i64 },
    Rm { id: i64 },
    List,
}

#[derive(clap::Subcommand, Debug)]
enum MealCommand {
    Add {
        name: String,
        #[arg(long, default_value_t = 0)]
        calories: i64,
    },
    Today,
}

#[derive(clap::Subcommand, Debug)]
enum SleepCommand {
    Start,
    Wake,
    Week,
}

#[derive(clap::Subcommand, Debug)]
enum SessionCommand {
    Start { name: Vec<String> },
    Stop {
        #[arg(long)]
        comment: Option<String>,
    },
    Status,
}

#[derive(clap::Subcommand, Debug)]
enum JournalCommand {
    Add {
        content: Vec<String>,
        #[arg(long, default_value = "neutral")]
        mood: String,
    },
    List,
    Rm { id: i64 },
}

#[derive(clap::Subcommand, Debug)]
enum FinanceCommand {
    Add {
        #[arg(value_parser = parse_finance_kind)]
        kind: FinanceKind,
        amount: f64,
        category: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    List,
    Rm { id: i64 },
    Stats,
}

fn parse_finance_kind(raw: &str) -> std::result::Result<FinanceKind, String> {
    raw.parse().map_err(|e: LifehubError| e.to_string())
}

fn joined(words: &[String]) -> String {
    words.join(" ")
}

fn print_events(hub: &LifeHub, events: &[HistoryEvent]) {
    if events.is_empty() {
        println!("{}", style("Nothing logged yet.").color256(245));
        return;
    }
    let offset = hub.config().utc_offset();
    for event in events {
        let secondary = event
            .secondary_info
            .as_deref()
            .map(|s| format!(" ({s})"))
            .unwrap_or_default();
        println!(
            "{} {:<8} {}{}",
            style(format_hhmm(event.timestamp, offset)).color256(245),
            style(event.event_type.as_str().to_uppercase()).color256(81).bold(),
            event.content,
            style(secondary).color256(245)
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,lifehub=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?.resolve_env();
    if let Some(db) = cli.db {
        config.storage = Some(StorageConfig {
            sqlite_path: Some(db),
        });
    }
    let hub = LifeHub::from_config(config).await?;
    let ctx = UserContext::authenticated(cli.user_id);
    let tracker = hub.tracker();

    match cli.command {
        Commands::Task { command } => match command {
            TaskCommand::Add { description } => {
                let task = tracker.add_task(&ctx, &joined(&description)).await?;
                println!("Added task #{}: {}", task.id, task.description);
            }
            TaskCommand::Done { id } => {
                tracker.set_task_completed(&ctx, id, true).await?;
                println!("Task #{id} completed.");
            }
            TaskCommand::Undo { id } => {
                tracker.set_task_completed(&ctx, id, false).await?;
                println!("Task #{id} reopened.");
            }
            TaskCommand::Rm { id } => {
                tracker.delete_task(&ctx, id).await?;
                println!("Task #{id} deleted.");
            }
            TaskCommand::List => {
                for task in tracker.list_tasks(&ctx).await? {
                    let mark = if task.completed { "x" } else { " " };
                    println!("[{mark}] #{:<4} {}", task.id, task.description);
                }
            }
        },
        Commands::Meal { command } => match command {
            MealCommand::Add { name, calories } => {
                let meal = tracker.add_meal(&ctx, &name, calories).await?;
                println!("Logged {} ({} kcal).", meal.name, meal.calories);
            }
            MealCommand::Today => {
                let meals = tracker.meals_today(&ctx).await?;
                let total: i64 = meals.iter().map(|m| m.calories).sum();
                for meal in &meals {
                    println!("  {} ({} kcal)", meal.name, meal.calories);
                }
                println!("{}", style(format!("Total: {total} kcal")).bold());
            }
        },
        Commands::Workout {
            activity_type,
            distance_km,
            minutes,
        } => {
            let workout = tracker
                .log_workout(
                    &ctx,
                    NewWorkout {
                        activity_type,
                        distance_km,
                        duration_mins: minutes,
                    },
                )
                .await?;
            println!(
                "Logged {} ({} kcal burned).",
                workout.activity_type,
                workout.calories_burned.unwrap_or_default()
            );
        }
        Commands::Sleep { command } => match command {
            SleepCommand::Start => {
                tracker.start_sleep(&ctx).await?;
                println!("Good night.");
            }
            SleepCommand::Wake => {
                let sleep = tracker.wake_up(&ctx).await?;
                let minutes = sleep.duration_minutes.unwrap_or_default();
                println!("Slept for {}h {}m.", minutes / 60, minutes % 60);
            }
            SleepCommand::Week => {
                let offset = hub.config().utc_offset();
                for log in tracker.sleep_logs_since(&ctx, 7).await? {
                    let bed = log
                        .bed_time
                        .map(|ts| format_hhmm(ts, offset))
                        .unwrap_or_default();
                    match log.duration_minutes {
                        Some(mins) => println!("  {bed}  {}h {}m", mins / 60, mins % 60),
                        None => println!("  {bed}  in progress"),
                    }
                }
            }
        },
        Commands::Session { command } => match command {
            SessionCommand::Start { name } => {
                let session = tracker.start_session(&ctx, &joined(&name)).await?;
                println!("Started '{}'.", session.activity_name);
            }
            SessionCommand::Stop { comment } => {
                let session = tracker.stop_session(&ctx, comment.as_deref()).await?;
                println!(
                    "Stopped '{}' after {}.",
                    session.activity_name,
                    format_compact_duration(session.duration_seconds.unwrap_or_default())
                );
            }
            SessionCommand::Status => match tracker.active_session(&ctx).await? {
                Some(session) => println!("Running: {}", session.activity_name),
                None => println!("{}", style("No active session.").color256(245)),
            },
        },
        Commands::Journal { command } => match command {
            JournalCommand::Add { content, mood } => {
                let mood = Mood::parse_or_neutral(Some(&mood));
                let entry = tracker
                    .add_journal_entry(&ctx, &joined(&content), mood)
                    .await?;
                println!("Saved entry #{} ({}).", entry.id, entry.mood.as_str());
            }
            JournalCommand::List => {
                for entry in tracker.list_journal(&ctx).await? {
                    println!(
                        "#{:<4} [{}] {}",
                        entry.id,
                        style(entry.mood.as_str()).color256(214),
                        entry.content
                    );
                }
            }
            JournalCommand::Rm { id } => {
                tracker.delete_journal_entry(&ctx, id).await?;
                println!("Entry #{id} deleted.");
            }
        },
        Commands::Vault => {
            let offset = hub.config().utc_offset();
            for log in tracker.list_private_logs(&ctx).await? {
                println!(
                    "#{:<4} {} {}",
                    log.id,
                    style(format_hhmm(log.created_at, offset)).color256(245),
                    log.content
                );
            }
        }
        Commands::Finance { command } => match command {
            FinanceCommand::Add {
                kind,
                amount,
                category,
                description,
                date,
            } => {
                let record = tracker
                    .add_finance_record(
                        &ctx,
                        NewFinanceRecord {
                            kind,
                            amount,
                            category,
                            description,
                            date,
                        },
                    )
                    .await?;
                println!(
                    "Recorded {} of {:.2} on {}.",
                    record.kind.as_str(),
                    record.amount,
                    record.date
                );
            }
            FinanceCommand::List => {
                for record in tracker.list_finance_records(&ctx).await? {
                    let sign = match record.kind {
                        FinanceKind::Income => "+",
                        FinanceKind::Expense => "-",
                    };
                    println!(
                        "#{:<4} {} {sign}{:.2} {}",
                        record.id, record.date, record.amount, record.category
                    );
                }
            }
            FinanceCommand::Rm { id } => {
                tracker.delete_finance_record(&ctx, id).await?;
                println!("Record #{id} deleted.");
            }
            FinanceCommand::Stats => {
                let stats = tracker.finance_stats(&ctx).await?;
                println!("Balance:        {:.2}", stats.total_balance);
                println!("Income today:   {:.2}", stats.income_today);
                println!("Expense today:  {:.2}", stats.expense_today);
                println!("Expense week:   {:.2}", stats.expense_week);
            }
        },
        Commands::History { limit, today } => {
            let events = if today {
                hub.history().today(&ctx).await?
            } else {
                hub.recent_history(&ctx, limit).await?
            };
            print_events(&hub, &events);
        }
        Commands::Summary { generate } => {
            let summary = hub.summary()?;
            if generate {
                match summary.generate_daily(&ctx).await? {
                    SummaryOutcome::NothingToSummarize => {
                        println!("{}", style("Nothing to summarize today.").color256(245))
                    }
                    SummaryOutcome::Generated(summary) => println!("{}", summary.content),
                }
            } else {
                match summary.latest_for_today(&ctx).await? {
                    Some(summary) => println!("{}", summary.content),
                    None => println!("{}", style("No summary yet today.").color256(245)),
                }
            }
        }
        Commands::Log { text } => {
            let event = tracker
                .quick_log(&ctx, &joined(&text), &RegexClassifier)
                .await?;
            print_events(&hub, std::slice::from_ref(&event));
        }
        Commands::Chat { message } => {
            let mut session = hub.chat_session()?;
            if !message.is_empty() {
                println!("{}", session.send(&joined(&message)).await?);
                return Ok(());
            }
            println!(
                "{}",
                style("Enter your messages (Ctrl+D to exit):").color256(245)
            );
            let stdin = std_io::stdin();
            loop {
                print!("{} ", style("➜").color256(45).bold());
                std_io::stdout()
                    .flush()
                    .map_err(|e| LifehubError::Runtime(e.to_string()))?;
                let mut line = String::new();
                let read = stdin
                    .lock()
                    .read_line(&mut line)
                    .map_err(|e| LifehubError::Runtime(e.to_string()))?;
                if read == 0 {
                    println!();
                    break;
                }
                if line.trim().is_empty() {
                    continue;
                }
                match session.send(&line).await {
                    Ok(reply) => println!("{}", reply),
                    Err(err) => println!("{} {}", style("error:").red(), err),
                }
            }
        }
    }
    Ok(())
}
