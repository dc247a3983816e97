use std::ffi::OsString;

use clap::Parser;

use crate::api::DEFAULT_API_BASE;
use crate::types::LogLevel;

pub const USAGE_HINT: &str = "A user must be provided, try: sotwe-dl --user:<username>\n\
    Optionally, add --cursor:<cursor> to start directly at a specific cursor,\n\
    or pass --update to refresh every user already in the media directory.";

#[derive(Parser, Debug)]
#[command(
    name = "sotwe-dl",
    about = "Download images and videos from a profile timeline",
    version
)]
pub struct Cli {
    /// Profile to download
    #[arg(long = "user", visible_alias = "u")]
    pub user: Option<String>,

    /// Start at this pagination cursor instead of the newest page
    #[arg(long = "cursor", visible_alias = "c")]
    pub cursor: Option<String>,

    /// Skip media posted by other users (reposts and replies)
    #[arg(long = "noextra", visible_alias = "ne")]
    pub no_extra: bool,

    /// Keep paginating past content a previous run already downloaded
    #[arg(long = "dupe", visible_alias = "d")]
    pub dupe: bool,

    /// Refresh every user folder already present in the media directory
    #[arg(long = "update", visible_alias = "upd")]
    pub update: bool,

    /// Media root directory
    #[arg(long, default_value = "media")]
    pub directory: String,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Timeline API base URL
    #[arg(long, env = "SOTWE_API_BASE", default_value = DEFAULT_API_BASE, hide = true)]
    pub api_base: String,
}

/// Rewrite `--key:value` arguments as `--key=value` so clap accepts the
/// colon form. Anything else passes through untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            let Some(s) = arg.to_str() else {
                return arg;
            };
            let Some(flag) = s.strip_prefix("--") else {
                return arg;
            };
            match flag.split_once(':') {
                Some((key, value)) if !key.is_empty() && !key.contains('=') => {
                    OsString::from(format!("--{}={}", key, value))
                }
                _ => arg,
            }
        })
        .collect()
}
