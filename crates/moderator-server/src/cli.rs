use crate::config::{ConfigOverrides, LogFormat};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "moderator")]
#[command(author, version, about = "Multilingual toxicity classification service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MODERATOR_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long, env = "MODERATOR_LISTEN")]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "MODERATOR_PORT")]
    pub port: Option<u16>,

    /// Inference device (cpu, cuda, cuda:N, metal)
    #[arg(short, long, env = "MODERATOR_DEVICE")]
    pub device: Option<String>,

    /// Verdict threshold
    #[arg(short, long, env = "MODERATOR_THRESHOLD")]
    pub threshold: Option<f32>,

    /// Checkpoint URL or local path
    #[arg(long, env = "MODERATOR_CHECKPOINT")]
    pub checkpoint: Option<String>,

    /// Log output format
    #[arg(long, value_enum, env = "MODERATOR_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl From<&Cli> for ConfigOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            listen: cli.listen.clone(),
            port: cli.port,
            device: cli.device.clone(),
            threshold: cli.threshold,
            checkpoint: cli.checkpoint.clone(),
            log_format: cli.log_format,
        }
    }
}
