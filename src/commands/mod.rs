use clap::ValueEnum;

mod collection;
mod config_cmd;

pub use collection::CollectionCommand;
pub use config_cmd::ConfigCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
