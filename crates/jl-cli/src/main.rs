use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use jl_core::admin::{self, ReportStatus};
use serde::Serialize;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

const DB_MAX_CONNECTIONS: u32 = 2;

#[derive(Parser)]
#[command(name = "joylet", version, about = "Joylet positive micro-posting backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Api,
    /// Apply embedded database migrations
    Migrate,
    /// Inspect and manage accounts
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    /// Review moderation reports
    Reports {
        #[command(subcommand)]
        command: ReportsCommand,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    /// Print all users as JSON
    List(OutputArgs),
    /// Mark an account verified and drop its pending verification tokens
    Verify {
        #[arg(long)]
        email: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand)]
enum ReportsCommand {
    /// Print moderation reports as JSON
    List {
        /// open, dismissed or actioned
        #[arg(long)]
        status: Option<ReportStatus>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Close an open report
    Resolve {
        #[arg(long)]
        report_id: Uuid,
        /// dismissed or actioned; actioned also removes the post
        #[arg(long)]
        status: ReportStatus,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Clone, Copy)]
struct OutputArgs {
    /// Pretty-print JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Api => {
            let config = jl_api::load_config()?;
            jl_api::run(config).await?;
        }
        Commands::Migrate => {
            let pool = connect().await?;
            jl_core::migrations::run(&pool).await?;
        }
        Commands::Users { command } => {
            let pool = connect().await?;
            match command {
                UsersCommand::List(output) => {
                    let users = admin::list_users(&pool).await?;
                    print_json(&users, output)?;
                }
                UsersCommand::Verify { email, output } => {
                    let user = admin::verify_user(&pool, &email).await?;
                    tracing::info!(user_id = %user.id, "email verified by operator");
                    print_json(&user, output)?;
                }
            }
        }
        Commands::Reports { command } => {
            let pool = connect().await?;
            match command {
                ReportsCommand::List { status, output } => {
                    let reports = admin::list_reports(&pool, status).await?;
                    print_json(&reports, output)?;
                }
                ReportsCommand::Resolve {
                    report_id,
                    status,
                    output,
                } => {
                    let report = admin::resolve_report(&pool, report_id, status).await?;
                    tracing::info!(
                        report_id = %report.id,
                        status = %report.status,
                        "report resolved"
                    );
                    print_json(&report, output)?;
                }
            }
        }
    }

    Ok(())
}

async fn connect() -> Result<Pool<Postgres>> {
    jl_core::logging::init("jl-cli");
    let database_url = jl_core::config::required_env("DATABASE_URL")?;
    jl_core::db::connect(&database_url, DB_MAX_CONNECTIONS).await
}

fn print_json<T: Serialize>(value: &T, output: OutputArgs) -> Result<()> {
    let rendered = if output.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}
