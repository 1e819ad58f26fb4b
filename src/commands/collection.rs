use clap::{Args, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;

use modulux::app::App;
use modulux::schema::{CollectionSchema, Field, FieldClass};

use super::OutputFormat;

#[derive(Args)]
pub struct CollectionCommand {
    #[command(subcommand)]
    pub command: CollectionSubcommand,
}

#[derive(Subcommand)]
pub enum CollectionSubcommand {
    /// List all collections
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a collection's schema
    Show {
        /// Collection name
        name: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create a collection from a JSON schema file
    Create {
        /// Path to the schema file
        file: PathBuf,
    },

    /// Delete a collection and all of its entries
    Delete {
        /// Collection name
        name: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl CollectionCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            CollectionSubcommand::List { format } => {
                let collections = app.collections.get_all_collection_names().await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&collections)?);
                    }
                    OutputFormat::Text => {
                        if collections.is_empty() {
                            println!("No collections found.");
                            return Ok(());
                        }
                        println!("{:<30} TITLE", "NAME");
                        println!("{}", "-".repeat(60));
                        for c in &collections {
                            println!("{:<30} {}", c.name, c.title);
                        }
                    }
                }
                Ok(())
            }

            CollectionSubcommand::Show { name, format } => {
                let schema = app.collections.get_collection_schema(name).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&schema)?);
                    }
                    OutputFormat::Text => print_schema(&schema),
                }
                Ok(())
            }

            CollectionSubcommand::Create { file } => {
                let contents = std::fs::read_to_string(file)
                    .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
                let schema: CollectionSchema = serde_json::from_str(&contents)
                    .map_err(|e| format!("Invalid schema in '{}': {}", file.display(), e))?;

                let schema = app.collections.create_collection(schema).await?;
                println!("Created collection: {} ({})", schema.name, schema.title);
                Ok(())
            }

            CollectionSubcommand::Delete { name, force } => {
                let schema = app.collections.get_collection_schema(name).await?;

                // Confirm deletion unless --force is used
                if !force {
                    print!(
                        "Delete collection '{}' and all of its entries? [y/N] ",
                        schema.name
                    );
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                let cleanup = app.collections.delete_collection(name).await?;
                println!("Deleted collection: {}", schema.name);

                let report = cleanup.await?;
                if !report.is_clean() {
                    println!("Could not delete {} image(s):", report.failed.len());
                    for key in &report.failed {
                        println!("  {}", key);
                    }
                }
                Ok(())
            }
        }
    }
}

fn print_schema(schema: &CollectionSchema) {
    println!("{} ({})", schema.title, schema.name);
    if let Some(description) = &schema.description {
        println!("{}", description);
    }
    println!();
    for field in &schema.fields {
        print_field(field, 1);
    }
}

fn print_field(field: &Field, depth: usize) {
    let indent = "  ".repeat(depth);
    let required = if field.required == Some(true) { " *" } else { "" };
    println!("{}{}: {}{}", indent, field.name, field.field_type(), required);

    match field.class() {
        FieldClass::Leaf => {}
        FieldClass::Composite | FieldClass::Array => {
            for child in field.child_fields() {
                print_field(child, depth + 1);
            }
        }
    }
}
