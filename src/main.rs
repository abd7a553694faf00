use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use rust_jetport::deploy::{apply_with_repair, DeployRequest};
use rust_jetport::repair::{self, CompletionClient, HttpCompletionClient, RepairRequest, SchemaContext};
use rust_jetport::source::{load_mapping, load_queries, read_text_with_fallback};
use rust_jetport::{convert, convert_all, ConversionResult, JetportConfig, StateMode};

#[derive(Parser)]
#[command(name = "rust-jetport")]
#[command(author, version, about = "Convert Access/Jet queries into PostgreSQL views and functions")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args)]
struct Common {
    /// Path to jetport.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON control-to-storage mapping
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Target schema (overrides the config file)
    #[arg(short, long)]
    schema: Option<String>,

    /// How form references are rendered: subquery or cross-join
    #[arg(long)]
    state_mode: Option<StateMode>,
}

impl Common {
    fn load_config(&self) -> Result<JetportConfig> {
        let mut config = JetportConfig::load(self.config.as_deref())?;
        if let Some(schema) = &self.schema {
            config.convert.schema = schema.clone();
        }
        if let Some(mode) = self.state_mode {
            config.convert.state_mode = mode;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert .sql files or JSON query descriptors into PostgreSQL DDL
    Convert {
        /// Query file or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the DDL script (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write a JSON report with warnings per query
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        common: Common,
    },

    /// Ask the completion service to fix DDL the database rejected
    Repair {
        /// JSON query descriptor of the failed query
        #[arg(short, long)]
        query: PathBuf,

        /// The DDL that failed
        #[arg(short, long)]
        failed: PathBuf,

        /// The database error message
        #[arg(short, long)]
        error: String,

        /// Database to introspect for the schema summary
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        #[arg(long, env = "JETPORT_API_KEY", hide_env_values = true)]
        api_key: String,

        #[command(flatten)]
        common: Common,
    },

    /// Convert and execute queries, repairing failures once
    Apply {
        /// Query file or directory
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, env = "DATABASE_URL")]
        database_url: String,

        /// Without a key, failures are reported but not repaired
        #[arg(long, env = "JETPORT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        #[command(flatten)]
        common: Common,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

fn script_for(results: &[ConversionResult]) -> String {
    let mut script = String::new();
    for result in results {
        script.push_str(&format!("-- {} ({})\n", result.object_name, result.object_kind.as_str()));
        for warning in &result.warnings {
            script.push_str(&format!("-- WARNING: {}\n", warning));
        }
        script.push_str(&result.script());
    }
    script
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Convert {
            input,
            output,
            report,
            common,
        } => {
            let config = common.load_config()?;
            let mapping = load_mapping(common.mapping.as_deref())?;
            let queries = load_queries(&input)?;
            let results = convert_all(&queries, &mapping, &config.convert);

            let warnings: usize = results.iter().map(|r| r.warnings.len()).sum();
            tracing::info!(queries = results.len(), warnings, "conversion finished");

            write_output(output.as_deref(), &script_for(&results))?;
            if let Some(report) = report {
                let json = serde_json::to_string_pretty(&results)?;
                write_output(Some(&report), &json)?;
            }
        }
        Commands::Repair {
            query,
            failed,
            error,
            database_url,
            api_key,
            common,
        } => {
            let config = common.load_config()?;
            let mapping = load_mapping(common.mapping.as_deref())?;
            let queries = load_queries(&query)?;
            let descriptor = queries
                .first()
                .with_context(|| format!("No query found in {}", query.display()))?;
            let failed_sql = read_text_with_fallback(&failed)?;

            let schema = match database_url {
                Some(url) => {
                    let pool = sqlx::PgPool::connect(&url)
                        .await
                        .context("Failed to connect to the database")?;
                    SchemaContext::introspect(&pool, &config.convert.schema).await?
                }
                None => SchemaContext::new(config.convert.schema.clone()),
            };

            let client = HttpCompletionClient::new(config.repair.clone(), api_key)?;
            let object_name = convert(descriptor, &mapping, &config.convert).object_name;
            let outcome = repair::repair(
                &client,
                &RepairRequest {
                    object_name: &object_name,
                    original_sql: &descriptor.sql,
                    failed_sql: &failed_sql,
                    error: &error,
                    schema: &schema,
                    mapping: &mapping,
                    options: &config.convert,
                },
            )
            .await?;
            for warning in &outcome.warnings {
                tracing::warn!("{}", warning);
            }
            println!("{}", outcome.statements.join("\n\n"));
        }
        Commands::Apply {
            input,
            database_url,
            api_key,
            common,
        } => {
            let config = common.load_config()?;
            let mapping = load_mapping(common.mapping.as_deref())?;
            let queries = load_queries(&input)?;
            let pool = sqlx::PgPool::connect(&database_url)
                .await
                .context("Failed to connect to the database")?;
            let client = match api_key {
                Some(key) => Some(HttpCompletionClient::new(config.repair.clone(), key)?),
                None => None,
            };

            let results = convert_all(&queries, &mapping, &config.convert);
            let mut failures = 0usize;
            for (query, result) in queries.iter().zip(&results) {
                let request = DeployRequest {
                    result,
                    original_sql: &query.sql,
                    mapping: &mapping,
                    options: &config.convert,
                };
                let client = client.as_ref().map(|c| c as &dyn CompletionClient);
                match apply_with_repair(&pool, client, &request).await {
                    Ok(report) => tracing::info!(
                        object = %report.object_name,
                        executed = report.executed,
                        repaired = report.repaired,
                        "applied"
                    ),
                    Err(err) => {
                        failures += 1;
                        tracing::error!(query = %query.name, "{}", err);
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} of {} queries failed to apply", failures, results.len());
            }
        }
    }

    Ok(())
}
