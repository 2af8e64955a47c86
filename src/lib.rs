pub mod bridge;
pub mod commands;
pub mod error;
pub mod services;
pub mod state;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

use services::{ChannelGateway, ChatService, ConfigService, HttpDirectoryApi, LogNotificationSink};
use state::SessionHandle;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    user_id: Option<String>,
    config_path: Option<PathBuf>,
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().context("--config requires a path")?;
                parsed.config_path = Some(PathBuf::from(value));
            }
            other => {
                if parsed.user_id.is_some() {
                    anyhow::bail!("unexpected argument: {}", other);
                }
                parsed.user_id = Some(other.to_string());
            }
        }
    }
    Ok(parsed)
}

/// Entry point: `parley [USER_ID] [--config PATH]`.
///
/// Speaks line-delimited JSON on stdin/stdout; see [`bridge`].
pub async fn run() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let mut config_service = match args.config_path {
        Some(path) => ConfigService::load(path),
        None => ConfigService::new(),
    }
    .context("Failed to load configuration")?;

    let level = config_service.get().log_level;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // a user id given on the command line is remembered for next time
    let user_id = match args.user_id {
        Some(raw) => config_service.set_user_id(&raw)?,
        None => match config_service.get().user_id {
            Some(saved) => services::config::validate_user_id(&saved)?,
            None => anyhow::bail!(
                "No identity configured; pass USER_ID or set user_id in {}",
                config_service.path().display()
            ),
        },
    };
    let config = config_service.get();

    log::info!(
        "Starting parley for {} against {}",
        user_id,
        config.server.api_url
    );

    let api = HttpDirectoryApi::new(&config.server.api_url)?;
    let (gateway, outbound) = ChannelGateway::open();
    let chat = ChatService::new(
        &user_id,
        Arc::new(gateway.clone()),
        Arc::new(LogNotificationSink),
        &config.timing,
    );
    let session = SessionHandle::open(chat, Arc::new(api), config.timing.roster_refresh());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = bridge::pump(stdin, tokio::io::stdout(), &session, &gateway, outbound).await;

    gateway.close();
    session.close().await;
    result.map_err(Into::into)
}
