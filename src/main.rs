use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use jobboard::{RatingTarget, Store};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jobboard")]
#[command(about = "Administer the job board database")]
struct Cli {
    /// Path to the database file
    #[arg(long, global = true, env = "JOBBOARD_DB")]
    db: Option<PathBuf>,

    /// Print rows as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Init,

    /// Manage users
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage job postings
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// List applications
    Applications {
        #[command(subcommand)]
        command: ApplicationCommands,
    },

    /// Show ratings
    Ratings {
        #[command(subcommand)]
        command: RatingCommands,
    },

    /// Maintain verification and reset tokens
    Tokens {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List all users, newest first
    List,

    /// Show one user
    Show {
        /// User ID
        id: i64,
    },

    /// Ban a user
    Ban {
        /// User ID
        id: i64,

        /// Ban expiry as ISO timestamp (e.g. 2030-01-01T00:00:00); omit for indefinite
        #[arg(short, long)]
        until: Option<String>,
    },

    /// Lift a ban
    Unban {
        /// User ID
        id: i64,
    },

    /// Mark an email address as verified
    Verify {
        /// Email address
        email: String,
    },

    /// Delete a user with their jobs, applications, and ratings
    Delete {
        /// User ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List jobs, newest first
    List {
        /// Maximum number of jobs to show
        #[arg(short, long)]
        limit: Option<u32>,

        /// Only jobs posted by this employer ID
        #[arg(short, long)]
        employer: Option<i64>,
    },

    /// Show job details
    Show {
        /// Job ID
        id: i64,
    },

    /// Delete a job with its applications and ratings
    Delete {
        /// Job ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum ApplicationCommands {
    /// Applications received for a job
    Job {
        /// Job ID
        id: i64,
    },

    /// Applications submitted by a user
    User {
        /// User ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum RatingCommands {
    /// Ratings for a user or job, with the average
    List {
        /// Target type (user, job)
        target_type: String,

        /// Target ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Delete expired tokens
    Purge,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = match cli.db {
        Some(path) => Store::new(path),
        None => Store::open_default(),
    };

    if !matches!(cli.command, Commands::Init) {
        store.ensure_initialized()?;
    }

    match cli.command {
        Commands::Init => {
            store
                .initialize()
                .with_context(|| format!("Failed to initialize {}", store.path().display()))?;
            println!("Database initialized at {}", store.path().display());
        }

        Commands::Users { command } => match command {
            UserCommands::List => {
                let users = store.list_users()?;
                if cli.json {
                    print_json(&users)?;
                } else if users.is_empty() {
                    println!("No users found.");
                } else {
                    println!(
                        "{:<6} {:<10} {:<30} {:<16} {:<8} {:<8}",
                        "ID", "ROLE", "EMAIL", "USERNAME", "VERIFIED", "BANNED"
                    );
                    println!("{}", "-".repeat(82));
                    for user in users {
                        println!(
                            "{:<6} {:<10} {:<30} {:<16} {:<8} {:<8}",
                            user.id,
                            user.role.as_str(),
                            truncate(&user.email, 28),
                            truncate(&user.username.unwrap_or_default(), 14),
                            if user.verified { "yes" } else { "no" },
                            if user.is_banned { "yes" } else { "no" },
                        );
                    }
                }
            }

            UserCommands::Show { id } => match store.get_user_by_id(id)? {
                Some(user) if cli.json => print_json(&user)?,
                Some(user) => {
                    println!("User #{}", user.id);
                    println!("Email: {}", user.email);
                    println!("Role: {}", user.role);
                    if let Some(username) = &user.username {
                        println!("Username: {}", username);
                    }
                    let name = [user.first_name.as_deref(), user.last_name.as_deref()]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" ");
                    if !name.is_empty() {
                        println!("Name: {}", name);
                    }
                    println!("Verified: {}", if user.verified { "yes" } else { "no" });
                    if user.is_banned {
                        match &user.banned_until {
                            Some(until) => println!("Banned until: {}", until),
                            None => println!("Banned: indefinitely"),
                        }
                    }
                    if let Some(created) = &user.created_at {
                        println!("Created: {}", created);
                    }

                    let jobs = store.list_jobs_by_employer(user.id)?;
                    if !jobs.is_empty() {
                        println!("\nJobs ({}):", jobs.len());
                        for job in jobs {
                            println!("  #{} - {}", job.id, job.title);
                        }
                    }
                    let summary = store.average_rating_for_target(RatingTarget::User(user.id))?;
                    if let Some(avg) = summary.average {
                        println!("\nRating: {:.1} ({} ratings)", avg, summary.count);
                    }
                }
                None => println!("User #{} not found.", id),
            },

            UserCommands::Ban { id, until } => {
                let until = until
                    .map(|s| {
                        jobboard::db::parse_timestamp(&s)
                            .ok_or_else(|| anyhow!("Invalid timestamp: {}", s))
                    })
                    .transpose()?;
                if store.set_user_ban(id, until)? {
                    match until {
                        Some(ts) => println!("Banned user #{} until {}.", id, ts),
                        None => println!("Banned user #{} indefinitely.", id),
                    }
                } else {
                    println!("User #{} not found.", id);
                }
            }

            UserCommands::Unban { id } => {
                if store.unset_user_ban(id)? {
                    println!("Lifted ban on user #{}.", id);
                } else {
                    println!("User #{} not found.", id);
                }
            }

            UserCommands::Verify { email } => {
                if store.set_user_verified(&email)? {
                    println!("Marked '{}' as verified.", email);
                } else {
                    println!("No user with email '{}'.", email);
                }
            }

            UserCommands::Delete { id } => {
                if store.delete_user(id)? {
                    println!("Deleted user #{} and everything they owned.", id);
                } else {
                    println!("User #{} not found.", id);
                }
            }
        },

        Commands::Jobs { command } => match command {
            JobCommands::List { limit, employer } => {
                let jobs = match employer {
                    Some(employer_id) => store.list_jobs_by_employer(employer_id)?,
                    None => store.list_jobs(limit)?,
                };
                if cli.json {
                    print_json(&jobs)?;
                } else if jobs.is_empty() {
                    println!("No jobs found.");
                } else {
                    println!(
                        "{:<6} {:<9} {:<30} {:<20} {:>14}",
                        "ID", "EMPLOYER", "TITLE", "LOCATION", "SALARY"
                    );
                    println!("{}", "-".repeat(83));
                    for job in jobs {
                        println!(
                            "{:<6} {:<9} {:<30} {:<20} {:>14}",
                            job.id,
                            job.employer_id,
                            truncate(&job.title, 28),
                            truncate(&job.location_text.unwrap_or_default(), 18),
                            truncate(&job.salary.unwrap_or_default(), 14),
                        );
                    }
                }
            }

            JobCommands::Show { id } => match store.get_job_by_id(id)? {
                Some(job) if cli.json => print_json(&job)?,
                Some(job) => {
                    println!("Job #{}", job.id);
                    println!("Title: {}", job.title);
                    println!("Employer: #{}", job.employer_id);
                    if let Some(location) = &job.location_text {
                        println!("Location: {}", location);
                    }
                    if let (Some(lat), Some(lng)) = (job.lat, job.lng) {
                        println!("Coordinates: {:.5}, {:.5}", lat, lng);
                    }
                    if let Some(salary) = job.salary.as_deref().filter(|s| !s.is_empty()) {
                        println!("Salary: {}", salary);
                    }
                    if let Some(tags) = &job.tags {
                        println!("Tags: {}", tags);
                    }
                    if let Some(created) = &job.created_at {
                        println!("Created: {}", created);
                    }
                    let applicants = store.list_applications_by_job(job.id)?;
                    println!("Applications: {}", applicants.len());
                    println!("\n--- Description ---\n{}", job.description);
                }
                None => println!("Job #{} not found.", id),
            },

            JobCommands::Delete { id } => {
                if store.delete_job(id)? {
                    println!("Deleted job #{}.", id);
                } else {
                    println!("Job #{} not found.", id);
                }
            }
        },

        Commands::Applications { command } => match command {
            ApplicationCommands::Job { id } => {
                let applicants = store.list_applications_by_job(id)?;
                if cli.json {
                    print_json(&applicants)?;
                } else if applicants.is_empty() {
                    println!("No applications for job #{}.", id);
                } else {
                    println!(
                        "{:<6} {:<30} {:<28} {:<6}",
                        "ID", "APPLICANT", "SUBMITTED", "FILES"
                    );
                    println!("{}", "-".repeat(72));
                    for applicant in applicants {
                        let app = &applicant.application;
                        println!(
                            "{:<6} {:<30} {:<28} {:<6}",
                            app.id,
                            truncate(&applicant.applicant_email, 28),
                            truncate(app.created_at.as_deref().unwrap_or("-"), 26),
                            file_count(
                                app.cover_letter_path.as_deref(),
                                app.resume_path.as_deref()
                            ),
                        );
                    }
                }
            }

            ApplicationCommands::User { id } => {
                let applications = store.list_applications_by_user(id)?;
                if cli.json {
                    print_json(&applications)?;
                } else if applications.is_empty() {
                    println!("No applications from user #{}.", id);
                } else {
                    println!("{:<6} {:<8} {:<28} {:<6}", "ID", "JOB", "SUBMITTED", "FILES");
                    println!("{}", "-".repeat(50));
                    for app in applications {
                        println!(
                            "{:<6} {:<8} {:<28} {:<6}",
                            app.id,
                            app.job_id,
                            truncate(app.created_at.as_deref().unwrap_or("-"), 26),
                            file_count(
                                app.cover_letter_path.as_deref(),
                                app.resume_path.as_deref()
                            ),
                        );
                    }
                }
            }
        },

        Commands::Ratings { command } => match command {
            RatingCommands::List { target_type, id } => {
                let target = RatingTarget::from_parts(&target_type, id).ok_or_else(|| {
                    anyhow!("Target type must be 'user' or 'job', got '{}'", target_type)
                })?;
                let ratings = store.list_ratings_for_target(target)?;
                let summary = store.average_rating_for_target(target)?;
                if cli.json {
                    print_json(&serde_json::json!({ "summary": summary, "ratings": ratings }))?;
                } else {
                    match summary.average {
                        Some(avg) => {
                            println!("Average: {:.2} from {} rating(s)\n", avg, summary.count)
                        }
                        None => println!("No ratings for {} #{}.", target.kind(), id),
                    }
                    for entry in ratings {
                        println!(
                            "#{} {}/5 by {}: {}",
                            entry.rating.id,
                            entry.rating.rating,
                            entry.rater_email,
                            entry.rating.comment.unwrap_or_default()
                        );
                    }
                }
            }
        },

        Commands::Tokens { command } => match command {
            TokenCommands::Purge => {
                let purged = store.purge_expired_tokens()?;
                println!("Purged {} expired token(s).", purged);
            }
        },
    }

    Ok(())
}

fn file_count(cover_letter_path: Option<&str>, resume_path: Option<&str>) -> usize {
    [cover_letter_path, resume_path].iter().flatten().count()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
