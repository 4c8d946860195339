use anyhow::Context;
use mergerbot::{ChangeTracker, Config, GitHub, MergerBot, parse_args};
use tracing::info;

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = match parse_args(std::env::args()) {
        Ok(options) => options,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };
    init_tracing(options.debug);

    let config = Config::load(&options.config)?;
    let repo = config.repo()?;
    let tracker = ChangeTracker::open(&config.meta.database_path)?;
    let client = mergerbot::github::setup_github_client()?;
    let forge = GitHub::new(client, repo);

    let bot = MergerBot::from_config(&config, forge, tracker, options.dry_run)
        .await
        .context("Failed to set up rules")?;
    let summary = bot.run().await?;

    info!(
        examined = summary.examined,
        matched = summary.matched,
        failed = summary.failed,
        "run complete"
    );
    Ok(())
}
