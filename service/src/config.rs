use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use pond::{AppManifest, ConnectionOpts};

const DEFAULT_APP_ID: &str = "com.example.fish-observer";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host of the local Actyx node. Unset uses the runtime's default.
    #[arg(long, env)]
    pub actyx_host: Option<String>,

    /// Port of the local Actyx node's API. Unset uses the runtime's default.
    #[arg(long, env)]
    pub actyx_port: Option<u16>,

    /// Application ID presented to the runtime. IDs under `com.example.` need
    /// no signature during development.
    #[arg(long, env, default_value = DEFAULT_APP_ID)]
    pub app_id: String,

    /// Human readable application name shown by the runtime.
    #[arg(long, env, default_value = "Fish Observer")]
    pub display_name: String,

    /// Version of the application presented in the manifest.
    #[arg(long, env, default_value = "0.0.1")]
    pub app_version: String,

    /// Signed app license, required for app IDs outside `com.example.`.
    #[arg(long, env)]
    app_signature: Option<String>,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// How often a command rejected by the runtime is attempted in total.
    /// 1 disables retries.
    #[arg(long, env, default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..))]
    pub dispatch_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn app_signature(&self) -> Option<String> {
        self.app_signature.clone()
    }

    pub fn set_app_signature(mut self, signature: String) -> Self {
        self.app_signature = Some(signature);
        self
    }

    /// Manifest presented to the runtime when opening the session.
    pub fn manifest(&self) -> AppManifest {
        AppManifest {
            app_id: self.app_id.clone(),
            display_name: self.display_name.clone(),
            version: self.app_version.clone(),
            signature: self.app_signature(),
        }
    }

    pub fn connection_opts(&self) -> ConnectionOpts {
        ConnectionOpts {
            actyx_host: self.actyx_host.clone(),
            actyx_port: self.actyx_port,
        }
    }

    /// Whether the app ID needs a signed license.
    pub fn requires_signature(&self) -> bool {
        !self.app_id.starts_with("com.example.")
    }
}
