use std::path::PathBuf;

use thiserror::Error;

use crate::download::{PageDelay, RunConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("A user must be provided")]
    MissingUser,

    #[error("Invalid user name '{0}'")]
    InvalidUser(String),
}

/// What this invocation downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    User {
        name: String,
        cursor: Option<String>,
    },
    /// Every user folder already present under the media root.
    UpdateAll,
}

/// Application configuration.
#[derive(Debug)]
pub struct Config {
    pub mode: Mode,
    pub directory: PathBuf,
    pub api_base: String,
    pub no_extra: bool,
    pub continue_on_duplicate: bool,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Names become folder names, so anything that could escape the media root
/// or collide with a `_` container is rejected.
fn validate_user(name: &str) -> Result<String, ConfigError> {
    let trimmed = name.trim().trim_start_matches('@');
    if trimmed.is_empty()
        || trimmed.starts_with('_')
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\'])
    {
        return Err(ConfigError::InvalidUser(name.to_string()));
    }
    Ok(trimmed.to_string())
}

impl Config {
    pub fn from_cli(cli: crate::cli::Cli) -> Result<Self, ConfigError> {
        let mode = if cli.update {
            if cli.user.is_some() || cli.cursor.is_some() {
                tracing::warn!("--update refreshes every user folder; --user and --cursor are ignored");
            }
            Mode::UpdateAll
        } else {
            let name = cli.user.as_deref().ok_or(ConfigError::MissingUser)?;
            Mode::User {
                name: validate_user(name)?,
                cursor: cli.cursor,
            }
        };

        Ok(Self {
            mode,
            directory: expand_tilde(&cli.directory),
            api_base: cli.api_base,
            no_extra: cli.no_extra,
            continue_on_duplicate: cli.dupe,
        })
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            directory: self.directory.clone(),
            api_base: self.api_base.clone(),
            no_extra: self.no_extra,
            continue_on_duplicate: self.continue_on_duplicate,
            page_delay: PageDelay::default(),
        }
    }
}
