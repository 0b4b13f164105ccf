mod jobs;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "instapulse-cli")]
#[command(about = "InstaPulse command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run a collection job once, as a cron trigger would
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// OAuth helpers
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[derive(Debug, Subcommand)]
enum JobCommands {
    /// Refresh credentials close to expiry
    RefreshTokens,
    /// Collect daily insights for every linked account
    CollectInsights {
        /// Also collect the audience breakdown
        #[arg(long)]
        audience: bool,
    },
}

#[derive(Debug, Subcommand)]
enum AuthCommands {
    /// Print the authorization dialog URL
    Url {
        /// CSRF state to embed; a random one is generated when omitted
        #[arg(long)]
        state: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = instapulse_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Auth {
            command: AuthCommands::Url { state },
        } => {
            let url = jobs::authorization_url(&config, state.as_deref())?;
            println!("{url}");
        }
        Commands::Db { command } => {
            let pool = connect(&config).await?;
            match command {
                DbCommands::Migrate => {
                    let applied = instapulse_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
                DbCommands::Ping => {
                    instapulse_db::ping(&pool).await?;
                    println!("database ok");
                }
            }
        }
        Commands::Jobs { command } => {
            let pool = connect(&config).await?;
            let runner = jobs::build_runner(pool, &config)?;
            match command {
                JobCommands::RefreshTokens => jobs::run_refresh_tokens(&runner).await?,
                JobCommands::CollectInsights { audience } => {
                    jobs::run_collect_insights(&runner, audience).await?;
                }
            }
        }
    }

    Ok(())
}

async fn connect(config: &instapulse_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = instapulse_db::PoolConfig::from_app_config(config);
    let pool = instapulse_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}
