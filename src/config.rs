use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::args::{parse_args, ParsedArgs};
use crate::site::DEFAULT_SITE_FILE;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Switches that never take a value
const FLAGS: &[&str] = &["dump", "D", "verbose", "v"];

/// Which delegate configures the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateKind {
    /// Routes from a site file
    Site,
    /// Serve a directory for every GET
    Static,
}

impl FromStr for DelegateKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "site" => Ok(DelegateKind::Site),
            "static" => Ok(DelegateKind::Static),
            _ => anyhow::bail!("Unknown delegate {:?} (expected 'site' or 'static')", s),
        }
    }
}

/// Server configuration parsed from command-line arguments
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub delegate: DelegateKind,
    /// Site file for the site delegate
    pub site: Option<PathBuf>,
    /// Root directory for the static delegate
    pub root: PathBuf,
    /// Log filter, `RUST_LOG` syntax; `RUST_LOG` itself wins when unset
    pub log_level: Option<String>,
    /// Print the route table after launch and exit
    pub dump: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            delegate: DelegateKind::Site,
            site: None,
            root: PathBuf::from("."),
            log_level: None,
            dump: false,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from arguments (program name excluded).
    ///
    /// Without `--site`, `site.kurt` in `working_dir` is used if it exists.
    pub fn from_args(args: &[String], working_dir: &Path) -> Result<Self> {
        let parsed: ParsedArgs = parse_args(args, FLAGS)?;
        let mut config = ServerConfig::default();

        if let Some(address) = parsed.get("address", "a") {
            config.address = address.to_string();
        }
        if let Some(port) = parsed.get("port", "p") {
            config.port = port
                .parse()
                .with_context(|| format!("Invalid port: {}", port))?;
        }

        // The delegate can be named positionally or with --delegate
        let delegate = parsed
            .get("delegate", "d")
            .or_else(|| parsed.positional.first().map(String::as_str));
        if let Some(delegate) = delegate {
            config.delegate = delegate.parse()?;
        }

        config.site = match parsed.get("site", "s") {
            Some(site) => Some(PathBuf::from(site)),
            None => {
                let candidate = working_dir.join(DEFAULT_SITE_FILE);
                candidate.is_file().then_some(candidate)
            }
        };
        if let Some(root) = parsed.get("root", "r") {
            config.root = PathBuf::from(root);
        }

        config.log_level = parsed.get("log-level", "l").map(str::to_string);
        if parsed.has_flag("verbose", "v") {
            config.log_level = Some("debug".to_string());
        }
        config.dump = parsed.has_flag("dump", "D");

        Ok(config)
    }
}

/// Parse the process arguments into ServerConfig
pub fn parse_config() -> Result<ServerConfig> {
    let args: Vec<String> = env::args().skip(1).collect();
    let working_dir = env::current_dir().context("Cannot determine working directory")?;
    ServerConfig::from_args(&args, &working_dir)
}
