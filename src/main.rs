use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cloudres::client::HttpClient;
use cloudres::config::Config;
use cloudres::resource::{Args as CallArgs, Model, Output, Resource, Service};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Declarative resources over a JSON service API
#[derive(Parser, Debug)]
#[command(name = "cloudres", version = cloudres::VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Config file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resource types and operations of a definition document
    Describe {
        /// Service name or definition file
        service: String,
    },
    /// Load definition documents and report errors
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Call one operation on a resource
    Call {
        /// Service name or definition file
        service: String,
        /// Resource type (the service name targets the service itself)
        resource: String,
        operation: String,
        /// Identifier as NAME=VALUE
        #[arg(long = "id", value_parser = parse_pair)]
        identifiers: Vec<(String, Value)>,
        /// Argument as NAME=VALUE
        #[arg(long = "arg", value_parser = parse_pair)]
        arguments: Vec<(String, Value)>,
        /// Extra request parameter as NAME=VALUE
        #[arg(long = "param", value_parser = parse_pair)]
        params: Vec<(String, Value)>,
        /// Service endpoint (overrides config)
        #[arg(long)]
        endpoint: Option<String>,
        /// Bearer token (overrides config)
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing_level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudres started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudres").join("cloudres.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudres").join("cloudres.log");
    }
    PathBuf::from("cloudres.log")
}

/// `NAME=VALUE`; the value is parsed as JSON when possible, else kept as a string
fn parse_pair(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{}'", raw))?;
    if name.is_empty() {
        return Err(format!("empty name in `{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

/// Resolve a service argument to (service name, definition file)
fn locate(config: &Config, service: &str) -> Result<(String, PathBuf)> {
    let as_path = Path::new(service);
    if as_path.is_file() {
        let name = as_path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Definition file name is not valid UTF-8")?;
        return Ok((name.to_string(), as_path.to_path_buf()));
    }
    match config.definition_path(service) {
        Some(path) => Ok((service.to_string(), path)),
        None => bail!(
            "No definition found for `{}'. Pass a file or add a definitions directory to {:?}",
            service,
            Config::config_path()
        ),
    }
}

fn load_model(config: &Config, service: &str) -> Result<Model> {
    let (name, path) = locate(config, service)?;
    Model::from_path(&name, &path).with_context(|| format!("Failed to load {}", path.display()))
}

fn render_resource(resource: &Resource) -> Value {
    json!({
        "type": resource.type_name(),
        "identifiers": resource.identifiers(),
        "data": resource.data().ok(),
    })
}

fn render(output: &Output) -> Value {
    match output {
        Output::Data(value) => value.clone(),
        Output::Resource(resource) => render_resource(resource),
        Output::Resources(resources) => resources.iter().map(render_resource).collect(),
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    match args.command {
        Command::Describe { service } => {
            let model = load_model(&config, &service)?;
            let descriptions: Vec<_> = std::iter::once(model.root())
                .chain(model.resources())
                .map(|d| d.describe())
                .collect();
            println!("{}", serde_json::to_string_pretty(&descriptions)?);
        }
        Command::Validate { files } => {
            let mut failed = 0;
            for file in &files {
                let name = file
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("service");
                match Model::from_path(name, file) {
                    Ok(model) => println!(
                        "{}: ok ({} resource types)",
                        file.display(),
                        model.resource_names().len()
                    ),
                    Err(err) => {
                        failed += 1;
                        println!("{}: {}", file.display(), err);
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} definition files are invalid", failed, files.len());
            }
        }
        Command::Call {
            service,
            resource,
            operation,
            identifiers,
            arguments,
            params,
            endpoint,
            token,
        } => {
            let model = load_model(&config, &service)?;
            let endpoint = config
                .effective_endpoint(model.name(), endpoint.as_deref())
                .context("No endpoint configured. Use --endpoint or set one in the config")?;

            let mut client = HttpClient::new(&endpoint)?;
            if let Some(token) = token.or_else(|| config.token.clone()) {
                client = client.with_token(token);
            }

            let service = Service::new(model, Arc::new(client));
            let target = if resource == service.name() {
                service.root()
            } else {
                service.resource(&resource, identifiers)?
            };

            let call_args = arguments
                .into_iter()
                .fold(CallArgs::new(), |acc, (name, value)| acc.arg(&name, value));
            let call_args = params
                .into_iter()
                .fold(call_args, |acc, (name, value)| acc.param(&name, value));

            tracing::info!("Calling {}#{}", resource, operation);
            let output = target.call(&operation, call_args).await?;
            println!("{}", serde_json::to_string_pretty(&render(&output))?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    if let Err(err) = run(args).await {
        tracing::error!("{:?}", err);
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("Name=x").unwrap(), ("Name".to_string(), json!("x")));
        assert_eq!(parse_pair("Max=10").unwrap(), ("Max".to_string(), json!(10)));
        assert_eq!(
            parse_pair("Tags=[\"a\"]").unwrap(),
            ("Tags".to_string(), json!(["a"]))
        );
        assert_eq!(parse_pair("Empty=").unwrap(), ("Empty".to_string(), json!("")));
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn test_cli_parses_call() {
        let args = Args::try_parse_from([
            "cloudres", "call", "s3.json", "Bucket", "Objects", "--id", "Name=b", "--param",
            "MaxKeys=5",
        ])
        .unwrap();
        let Command::Call {
            identifiers, params, ..
        } = args.command
        else {
            panic!("expected call");
        };
        assert_eq!(identifiers, vec![("Name".to_string(), json!("b"))]);
        assert_eq!(params, vec![("MaxKeys".to_string(), json!(5))]);
    }
}
