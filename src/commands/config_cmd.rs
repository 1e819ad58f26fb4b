use clap::{Args, Subcommand};

use modulux::config::Config;

use super::OutputFormat;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.display());
                        println!("port: {}", config.port);
                        println!("api_keys: {}", config.api_keys.len());
                        println!();

                        println!("storage.root: {}", config.storage.root.display());
                        println!("storage.public_url: {}", config.storage.public_url);
                        println!(
                            "storage.signing_secret: {}",
                            if config.storage.signing_secret.is_some() {
                                "set"
                            } else {
                                "not set (generated per process)"
                            }
                        );
                        println!("storage.url_ttl_secs: {}", config.storage.url_ttl_secs);
                        println!();

                        match &config.smtp {
                            Some(smtp) => println!("smtp: {}:{}", smtp.host, smtp.port),
                            None => println!("smtp: not configured"),
                        }
                        println!(
                            "notify.recipients: {}",
                            config.notify.recipients.join(", ")
                        );
                        println!();

                        println!("migration.batch_size: {}", config.migration.batch_size);
                        println!("migration.max_retries: {}", config.migration.max_retries);
                    }
                }
                Ok(())
            }
        }
    }
}
