use clap::Parser;
use std::path::PathBuf;

use crate::explorer::DEFAULT_PAGE_SIZE;

/// Interactive explorer for a Squirrels project server
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None, disable_version_flag = true)]
pub struct StudioConfig {
    #[clap(
        long,
        env = "SQRL_STUDIO_HOST",
        default_value = "http://localhost:4465",
        help = "Base URL of the Squirrels server"
    )]
    pub host: String,

    #[clap(long, env = "SQRL_STUDIO_PROJECT", help = "Project name to open on start")]
    pub project: Option<String>,

    #[clap(
        long,
        env = "SQRL_STUDIO_VERSION",
        default_value = "v1",
        help = "Project version to open on start"
    )]
    pub version: String,

    #[clap(long, env = "SQRL_STUDIO_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE, help = "Rows per result page")]
    pub page_size: usize,

    #[clap(long, env = "SQRL_STUDIO_SESSION_FILE", help = "Remember the login session in this file")]
    pub session_file: Option<PathBuf>,

    #[clap(long, help = "Read commands from stdin without prompts")]
    pub batch: bool,
}
