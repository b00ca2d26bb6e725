use anyhow::{Context, Result};
use dialoguer::Password;
use serde_json::json;
use std::sync::Arc;

use session_client::auth::LogTermination;
use session_client::config::{self, Command, LoginArgs};
use session_client::{AccountApi, SessionClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(base_url = %config.base_url, "Session client starting...");

    let settings = config.client_settings()?;
    let client = Arc::new(SessionClient::new(&settings, Arc::new(LogTermination))?);
    let account = AccountApi::new(client);

    match &config.command {
        Command::Login(args) => {
            let body = login(&account, args).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Me(args) => {
            login(&account, args).await?;
            let user = account
                .current_user()
                .await
                .context("Failed to fetch the current user")?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
    }

    Ok(())
}

/// Log in, prompting for the password if needed, then verify 2FA if a code was given
async fn login(account: &AccountApi, args: &LoginArgs) -> Result<serde_json::Value> {
    let password = match &args.password {
        Some(password) => password.clone(),
        None => Password::new()
            .with_prompt(format!("Password for {}", args.username))
            .interact()
            .context("Failed to read password")?,
    };

    let body = account
        .login(&json!({ "email": args.username, "password": password }))
        .await
        .map_err(|e| {
            for message in e.error_messages() {
                tracing::error!("{}", message);
            }
            e
        })
        .context("Login failed")?;
    tracing::info!("✅ Logged in as {}", args.username);

    match &args.otp {
        Some(otp) => {
            let body = account
                .verify_two_factor(&json!({ "otp_code": otp }))
                .await
                .context("Two-factor verification failed")?;
            tracing::info!("✅ Two-factor verification successful");
            Ok(body)
        }
        None => Ok(body),
    }
}
