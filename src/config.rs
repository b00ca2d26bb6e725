use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::time::Duration;

/// Default API base address
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

/// Default refresh endpoint, relative to the base address
pub const DEFAULT_REFRESH_PATH: &str = "auth/refresh-token/";

/// Session Client - authenticated API calls from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// API base address
    #[arg(short = 'u', long, env = "SESSION_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Refresh endpoint path, relative to the base address
    #[arg(long, env = "SESSION_REFRESH_PATH", default_value = DEFAULT_REFRESH_PATH)]
    pub refresh_path: String,

    /// Keep and send cookies (the refresh endpoint relies on them)
    #[arg(long, env = "SESSION_WITH_CREDENTIALS", default_value = "true", action = clap::ArgAction::Set)]
    pub with_credentials: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// Refresh call timeout in seconds (0 disables)
    #[arg(long, env = "REFRESH_TIMEOUT", default_value = "30")]
    pub refresh_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in and print the login response
    Login(LoginArgs),

    /// Log in, then print the current user
    Me(LoginArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct LoginArgs {
    /// Account email or username
    #[arg(long, env = "SESSION_USERNAME")]
    pub username: String,

    /// Account password (prompted when omitted)
    #[arg(long, env = "SESSION_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// One-time code for two-factor verification
    #[arg(long)]
    pub otp: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub base_url: String,
    pub refresh_path: String,
    pub with_credentials: bool,

    // Timeouts
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub refresh_timeout: u64,

    // HTTP client
    pub http_max_connections: usize,

    // Logging
    pub log_level: String,

    pub command: Command,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Ok(Self::from_args(args))
    }

    fn from_args(args: CliArgs) -> Self {
        Config {
            base_url: args.base_url,
            refresh_path: args.refresh_path,
            with_credentials: args.with_credentials,

            http_connect_timeout: env_or("HTTP_CONNECT_TIMEOUT", 30),
            http_request_timeout: args.http_timeout,
            refresh_timeout: args.refresh_timeout,

            http_max_connections: env_or("HTTP_MAX_CONNECTIONS", 20),

            log_level: args.log_level,

            command: args.command,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("SESSION_BASE_URL is not a valid URL: {}", self.base_url))?;

        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("SESSION_BASE_URL must use http or https: {}", self.base_url);
        }

        if self.refresh_path.trim_matches('/').is_empty() {
            anyhow::bail!("SESSION_REFRESH_PATH cannot be empty");
        }

        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        Ok(())
    }

    /// Settings for building a session client
    pub fn client_settings(&self) -> Result<ClientSettings> {
        let mut settings = ClientSettings::new(&self.base_url)?;
        settings.refresh_path = self.refresh_path.clone();
        settings.with_credentials = self.with_credentials;
        settings.connect_timeout = Duration::from_secs(self.http_connect_timeout);
        settings.request_timeout = Duration::from_secs(self.http_request_timeout);
        settings.max_connections = self.http_max_connections;
        settings.refresh_timeout =
            (self.refresh_timeout > 0).then(|| Duration::from_secs(self.refresh_timeout));
        Ok(settings)
    }
}

/// Construction input for `SessionClient`
#[derive(Clone, Debug)]
pub struct ClientSettings {
    /// Always ends with `/` so relative paths append instead of replacing
    pub base_url: Url,
    pub refresh_path: String,
    pub with_credentials: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_connections: usize,
    pub refresh_timeout: Option<Duration>,
}

impl ClientSettings {
    /// Settings with defaults for everything but the base address
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            with_credentials: true,
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_connections: 20,
            refresh_timeout: Some(Duration::from_secs(30)),
        })
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.refresh_timeout = timeout;
        self
    }
}

/// Parse a numeric environment variable, falling back to `default`
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let args = CliArgs::try_parse_from(args).unwrap();
        Config::from_args(args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["session-client", "me", "--username", "ana@example.com"]);

        assert_eq!(config.refresh_path, DEFAULT_REFRESH_PATH);
        assert!(config.with_credentials);
        assert_eq!(config.refresh_timeout, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_credentials_can_be_disabled() {
        let config = parse(&[
            "session-client",
            "--with-credentials",
            "false",
            "login",
            "--username",
            "ana@example.com",
        ]);
        assert!(!config.with_credentials);
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut config = parse(&["session-client", "me", "--username", "ana"]);

        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.base_url = "ftp://example.com/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_refresh_path() {
        let mut config = parse(&["session-client", "me", "--username", "ana"]);
        config.refresh_path = "/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_settings_conversion() {
        let mut config = parse(&["session-client", "me", "--username", "ana"]);
        config.base_url = "https://api.example.com/v1".to_string();
        config.refresh_timeout = 0;

        let settings = config.client_settings().unwrap();
        assert_eq!(settings.base_url.as_str(), "https://api.example.com/v1/");
        assert!(settings.refresh_timeout.is_none());
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_client_settings_trailing_slash_kept() {
        let settings = ClientSettings::new("http://localhost:8000/").unwrap();
        assert_eq!(settings.base_url.as_str(), "http://localhost:8000/");
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("SESSION_CLIENT_TEST_UNSET_VARIABLE", 7u64), 7);
    }
}
