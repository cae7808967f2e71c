use clap::{Parser, Subcommand};
use emr_query::identifier::{BaseCharacterSet, LuhnModNValidator, MOD30_BASE};
use emr_query::logging::{LogFormat, LoggingConfig};
use emr_query::{ConfigQueryRegistry, DatabaseConfig, ParameterSet, QueryService, StaticConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "emr-query",
    about = "Run registered EMR queries and work with check-digit identifiers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run a registered query and print its rows as JSON
    Search {
        /// JSON file mapping query ids to SQL templates
        #[arg(long)]
        queries: PathBuf,

        /// Query id to run
        query_id: String,

        /// Parameter as name=value; repeat a name to pass a list
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Print a payload followed by its Luhn mod N check character
    CheckDigit {
        payload: String,

        /// Alphabet to compute over
        #[arg(long, default_value = MOD30_BASE)]
        base: String,
    },

    /// Check an identifier's trailing check character
    Validate {
        identifier: String,

        /// Alphabet to validate over
        #[arg(long, default_value = MOD30_BASE)]
        base: String,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

fn validator(base: &str) -> emr_query::Result<LuhnModNValidator> {
    Ok(LuhnModNValidator::new(BaseCharacterSet::new(base)?))
}

async fn search(queries: PathBuf, query_id: &str, raw: Vec<(String, String)>) -> Result<(), Box<dyn std::error::Error>> {
    let document = std::fs::read_to_string(&queries)?;
    let registry = ConfigQueryRegistry::new(Arc::new(StaticConfig::from_json_str(&document)?));

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in raw {
        grouped.entry(name).or_default().push(value);
    }
    let params = ParameterSet::from_multi_map(grouped);

    let pool = DatabaseConfig::from_env()?.connect().await?;
    let service = QueryService::new(registry, pool);
    let rows = service.execute(query_id, &params).await?;
    debug!(rows = rows.len(), "search finished");

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let logging = if cli.verbose {
        LoggingConfig {
            level: "debug".into(),
            ..LoggingConfig::from_env()
        }
    } else {
        LoggingConfig {
            level: "warn".into(),
            format: LogFormat::Compact,
            include_location: false,
        }
    };
    logging.init()?;

    match cli.command {
        Command::Search {
            queries,
            query_id,
            params,
        } => {
            search(queries, &query_id, params).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckDigit { payload, base } => {
            println!("{}", validator(&base)?.valid_identifier(&payload)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { identifier, base } => {
            if validator(&base)?.is_valid(&identifier) {
                println!("{identifier}: valid");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{identifier}: invalid");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
