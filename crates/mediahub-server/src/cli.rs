use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "mediahub", version, about = "mediahub object storage and WebP conversion pipeline")]
pub struct Cli {
    /// Path to the JSON config file. Falls back to the `MEDIAHUB_CONFIG`
    /// environment variable, then `config.json`, when not given.
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
}
