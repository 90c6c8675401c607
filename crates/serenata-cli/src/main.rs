use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod commands;
mod context;
mod logging;

use context::CliContext;

#[derive(Debug, Parser)]
#[command(name = "serenata", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (default: ~/.config/serenata/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the session store (default: ~/.local/share/serenata/session.db)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Show or edit the song answers
    Answers {
        #[command(subcommand)]
        action: AnswersAction,
    },
    /// Generate songs from the stored answers
    ///
    /// Requests the first song, waits for it, then requests the second one
    /// a few seconds later. In full mode both songs are awaited before the
    /// comparison is shown. In fast mode the comparison is shown as soon as
    /// the first song is ready and the second one is awaited there.
    ///
    /// A failed or timed-out run sends you back to the details step; run
    /// the command again to start over.
    Generate {
        /// Funnel variant (fast or full); defaults to the configured one
        #[arg(long)]
        mode: Option<String>,
    },
    /// Show the songs available for comparison
    ///
    /// Without options the songs saved by the last visit are used.
    Compare {
        /// Comma-separated song ids, as in a shared link
        #[arg(long)]
        song_ids: Option<String>,

        /// A single song id
        #[arg(long)]
        song_id: Option<String>,
    },
    /// Buy one song or both and print the payment link
    Checkout {
        /// Id of the song to buy
        #[arg(long, conflicts_with = "bundle", required_unless_present = "bundle")]
        song: Option<String>,

        /// Buy both songs
        #[arg(long)]
        bundle: bool,

        /// Coupon code to apply
        #[arg(long)]
        coupon: Option<String>,

        /// WhatsApp number to deliver the songs to
        #[arg(long)]
        whatsapp: Option<String>,
    },
    /// Inspect or clear the saved session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum AnswersAction {
    /// Print the current answers
    Show,
    /// Set one answer, e.g. `answers set recipientName Ana`
    Set { field: String, value: String },
    /// Replace the answers with the contents of a TOML file
    Import { path: PathBuf },
}

#[derive(Debug, clap::Subcommand)]
enum SessionAction {
    /// Print the saved session
    Show,
    /// Forget the saved session
    Clear,
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Create the config file with defaults
    Init,
    /// Print an example config file
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands work without a usable session store.
    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Show => commands::config::show_config(cli.config.as_deref()),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Init => commands::config::init_config(),
            ConfigAction::Example => commands::config::show_example(),
        };
    }

    let ctx = CliContext::load(cli.config.as_deref(), cli.storage)?;
    logging::init(&ctx.config.logging)?;

    match cli.command {
        Commands::Answers { action } => match action {
            AnswersAction::Show => commands::answers::show(&ctx)?,
            AnswersAction::Set { field, value } => commands::answers::set(&ctx, &field, &value)?,
            AnswersAction::Import { path } => commands::answers::import(&ctx, &path)?,
        },
        Commands::Generate { mode } => {
            commands::run_generate(&ctx, mode.as_deref()).await?;
        }
        Commands::Compare { song_ids, song_id } => {
            commands::run_compare(&ctx, song_ids.as_deref(), song_id.as_deref()).await?;
        }
        Commands::Checkout {
            song,
            bundle,
            coupon,
            whatsapp,
        } => {
            let order = commands::checkout::Order {
                song,
                bundle,
                coupon,
                whatsapp,
            };
            commands::run_checkout(&ctx, order).await?;
        }
        Commands::Session { action } => match action {
            SessionAction::Show => commands::session::show(&ctx)?,
            SessionAction::Clear => commands::session::clear(&ctx)?,
        },
        Commands::Config { .. } => {}
    }

    Ok(())
}
