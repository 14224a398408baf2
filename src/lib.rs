pub mod config;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod profile;
pub mod providers;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::time::Duration;
use tracing::info;

use config::Config;
use gateway::Converser;
use model::ConverseOptions;

pub const DEFAULT_PROMPT: &str = "Write a short haiku about winter.";

/// Joins CLI words into one prompt, or returns [`DEFAULT_PROMPT`] when there are none.
pub fn prompt_from_args(args: &[String]) -> String {
    if args.is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        args.join(" ")
    }
}

/// Converts raw process arguments, rejecting any that are not valid UTF-8.
pub fn collect_args(raw: impl IntoIterator<Item = OsString>) -> Result<Vec<String>> {
    raw.into_iter()
        .map(|arg| {
            arg.into_string().map_err(|bad| {
                anyhow!(
                    "Invalid UTF-8 in command-line argument: {}",
                    bad.to_string_lossy()
                )
            })
        })
        .collect()
}

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let _logging = logging::init();

    let cfg = Config::from_env();
    info!(
        region = %cfg.region,
        model_id = %cfg.model_id,
        dry_run = cfg.dry_run,
        endpoint_override = cfg.endpoint_url.is_some(),
        auth = cfg.auth.as_ref().map_or("none", |auth| auth.as_str()),
        timeout_secs = cfg.timeout_secs,
        "loaded runtime configuration"
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")?;

    let args = collect_args(env::args_os().skip(1))?;
    let prompt = prompt_from_args(&args);
    let text = Converser::new(&client, &cfg)
        .converse(&prompt, &ConverseOptions::default())
        .await?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}").context("Failed to write reply to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}
