mod background;
mod bots;
mod chatlog;
mod client;
mod config;
mod constants;
mod dispatch;
mod error;
mod helpers;
mod parser;
mod schedule;
mod session;
mod traits;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::client::PfcClient;
use crate::config::{load_config_file, Config};
use crate::dispatch::CommandRegistry;
use crate::error::AppError;
use crate::traits::{ChatApiImpl, Mailer, SmtpMailer};

#[derive(Parser)]
#[command(name = "pfcbot", about = "Command bot for PHP Free Chat rooms")]
struct Args {
    /// YAML or JSON config file
    #[arg(long, env = "PFCBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Chat endpoint, e.g. http://example.org/chat/index.php
    #[arg(long, env = "PFCBOT_CHAT_URL")]
    chat_url: Option<String>,

    /// Display-name prefix
    #[arg(long, env = "PFCBOT_NAME")]
    name: Option<String>,
}

fn load_config(args: Args) -> Result<Config, AppError> {
    let mut config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => Config::default(),
    };
    config.apply_overrides(args.chat_url, args.name);
    config.validate()?;
    Ok(config)
}

fn build_mailer(config: &Config) -> Option<Arc<dyn Mailer>> {
    let mail = config.mail.as_ref()?;
    match SmtpMailer::from_config(mail) {
        Ok(mailer) => Some(Arc::new(mailer)),
        Err(e) => {
            warn!(server = %mail.server, "Mail disabled: {e}");
            None
        }
    }
}

async fn start(config: Config) -> Result<(), AppError> {
    let api = ChatApiImpl::new(&config.chat.url, config.chat.request_timeout())?;
    let log = chatlog::open_log(&config.log)?;

    let mut registry = CommandRegistry::new();
    bots::register_enabled(&mut registry, &config.bots, log, build_mailer(&config));

    let mut client = PfcClient::new(
        Box::new(api),
        registry,
        config.chat.poll_delay(),
        config.chat.send_retry_delay(),
    );
    let display_name = config.chat.display_name();
    info!(url = %config.chat.url, name = %display_name, "pfcbot connecting");
    client.connect(&display_name).await?;
    client.schedule_update();

    if let Some(feed) = config.feed.clone() {
        background::spawn_recent_changes(feed, config.chat.request_timeout(), client.outbox())?;
    }

    client.run().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pfcbot=info")),
        )
        .init();

    let args = Args::parse();
    let config = match load_config(args) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = start(config).await {
        error!("pfcbot stopped: {e}");
        std::process::exit(1);
    }
}
