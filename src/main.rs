use anyhow::{Context, Result};
use bibcite::config::{default_config_path, find_config_file, load_config, Config};
use bibcite::library::{
    CollectionExporter, CollectionPathResolver, ExportFormat, LibraryCache, LibraryError,
};
use bibcite::models::{CollectionPath, ErrorKind, LibraryId, ReferenceView, ViewMode, ViewState};
use bibcite::references::{frontmatter, DocumentEvent, ReferenceAggregator, ReferenceSession};
use bibcite::rpc::{HttpRpcChannel, RpcChannel};
use bibcite::ui::{self, Status};
use bibcite::utils::{with_retry, RetryConfig};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// bibcite - Resolve Zotero collections and check document citations against them
#[derive(Parser, Debug)]
#[command(name = "bibcite")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve Zotero collections and check document citations against them", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Request timeout in seconds (overrides the config file)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Retry this many times while Zotero is unreachable
    #[arg(long, global = true, default_value_t = 0)]
    retries: u32,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Automatic based on terminal (table if TTY, JSON otherwise)
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    fn resolve(self) -> Self {
        match self {
            OutputFormat::Auto if ui::is_terminal() => OutputFormat::Table,
            OutputFormat::Auto => OutputFormat::Json,
            other => other,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List libraries and their collection paths
    #[command(alias = "libs")]
    Libraries,

    /// Resolve a collection path to its library id and collection key
    Resolve {
        /// Collection path, e.g. "My Library/Thesis/Chapter 1"
        path: String,
    },

    /// Print the export of a collection
    Export {
        /// Collection path
        path: String,

        /// Export format: json, jzon, betterbibtex or biblatex (default from config)
        #[arg(long, short)]
        format: Option<ExportFormat>,
    },

    /// Show the references of a markdown document
    #[command(alias = "r")]
    Refs {
        /// Markdown file
        file: PathBuf,

        /// List the whole collection instead of the cited keys
        #[arg(long, short)]
        bibliography: bool,

        /// Include annotations of each item
        #[arg(long, short)]
        annotations: bool,

        /// Collection path (default: read from the document's frontmatter)
        #[arg(long, short)]
        collection: Option<String>,
    },

    /// List citation keys of a collection starting with a prefix
    Suggest {
        /// Collection path
        path: String,

        /// Key prefix
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Export specific citation keys
    Cite {
        /// Library id (see `bibcite libraries`)
        library_id: LibraryId,

        /// Citation keys
        #[arg(required = true)]
        keys: Vec<String>,

        /// Export format
        #[arg(long, short, default_value_t = ExportFormat::BetterBibtex)]
        format: ExportFormat,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Target path (default: user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

/// Everything a command needs to talk to the service
struct Services {
    resolver: CollectionPathResolver,
    exporter: CollectionExporter,
    aggregator: ReferenceAggregator,
    library_cache: Arc<LibraryCache>,
}

impl Services {
    fn new(config: &Config) -> Result<Self> {
        let channel: Arc<dyn RpcChannel> = Arc::new(
            HttpRpcChannel::new(&config.service).context("failed to create HTTP client")?,
        );
        tracing::debug!(base_url = %config.service.base_url(), "connecting to Better BibTeX");

        let library_cache = Arc::new(LibraryCache::new(config.resolver.library_cache_ttl()));
        let aggregator =
            ReferenceAggregator::from_config(channel, config, Arc::clone(&library_cache));

        Ok(Self {
            resolver: aggregator.resolver().clone(),
            exporter: aggregator.exporter().clone(),
            aggregator,
            library_cache,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("bibcite={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // Load configuration from file if specified or found in default locations
    let config_path = cli.config.clone().or_else(find_config_file);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }
    let mut config = load_config(config_path.as_deref())
        .with_context(|| match &config_path {
            Some(path) => format!("invalid configuration in {}", path.display()),
            None => "invalid configuration".to_string(),
        })?;
    if let Some(timeout) = cli.timeout {
        config.service.timeout_seconds = timeout;
    }

    let output = cli.output.resolve();
    let retry = RetryConfig::with_retries(cli.retries);

    match command {
        Commands::Config { command } => run_config(command, &config, cli.quiet)?,

        Commands::Libraries => {
            let services = Services::new(&config)?;
            let libraries = with_retry(retry, || services.resolver.libraries()).await?;

            match output {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(libraries.as_slice())?)
                }
                OutputFormat::Plain => {
                    for library in libraries.iter() {
                        println!("{}\t{}", library.id, library.name);
                        for path in library.collection_paths() {
                            println!("{}\t{}", library.id, path);
                        }
                    }
                }
                _ => {
                    let mut table = new_table(vec!["ID", "Library", "Collection path"]);
                    for library in libraries.iter() {
                        let paths = library.collection_paths();
                        if paths.is_empty() {
                            table.add_row(vec![library.id.to_string(), library.name.clone()]);
                        }
                        for path in paths {
                            table.add_row(vec![
                                library.id.to_string(),
                                library.name.clone(),
                                path,
                            ]);
                        }
                    }
                    println!("{table}");
                }
            }
        }

        Commands::Resolve { path } => {
            let services = Services::new(&config)?;
            let path = CollectionPath::new(path);
            let resolved = with_retry(retry, || services.resolver.resolve(&path)).await?;

            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
                OutputFormat::Plain => {
                    println!("{}\t{}", resolved.library_id, resolved.collection_key)
                }
                _ => {
                    let mut table = new_table(vec!["Path", "Library ID", "Collection key"]);
                    table.add_row(vec![
                        path.to_string(),
                        resolved.library_id.to_string(),
                        resolved.collection_key,
                    ]);
                    println!("{table}");
                }
            }
        }

        Commands::Export { path, format } => {
            let services = Services::new(&config)?;
            let path = CollectionPath::new(path);
            let format = format.unwrap_or(config.references.export_format);

            let resolved = with_retry(retry, || services.resolver.resolve(&path)).await?;
            let body = with_retry(retry, || services.exporter.export_text(&resolved, format)).await?;
            println!("{}", body.trim_end());
        }

        Commands::Refs {
            file,
            bibliography,
            annotations,
            collection,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let collection = collection.map(CollectionPath::new).or_else(|| {
                frontmatter::collection_path(&text, &config.references.frontmatter_field)
            });
            let mode = if bibliography {
                ViewMode::Bibliography
            } else {
                config.references.default_mode
            };

            let services = Services::new(&config)?;
            let session = ReferenceSession::new(services.aggregator, services.library_cache)
                .with_mode(mode);
            let event = DocumentEvent::Opened {
                document: file.display().to_string(),
                text,
                collection,
            };

            let session_ref = &session;
            let attempt = with_retry(retry, || {
                let event = event.clone();
                async move {
                    match session_ref.handle(event).await {
                        Some(view)
                            if view.state == ViewState::Failed(ErrorKind::ServiceUnreachable) =>
                        {
                            Err(LibraryError::ServiceUnreachable(view.state.message().to_string()))
                        }
                        _ => Ok(()),
                    }
                }
            })
            .await;
            if let Err(err) = attempt {
                tracing::debug!(error = %err, "reference view still failing after retries");
            }

            let view = session
                .current()
                .context("no reference view was produced")?;
            output_view(&view, output, annotations, cli.quiet)?;
        }

        Commands::Suggest { path, prefix } => {
            let services = Services::new(&config)?;
            let path = CollectionPath::new(path);
            let suggestions =
                with_retry(retry, || services.aggregator.suggest(&path, &prefix)).await?;

            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&suggestions)?),
                OutputFormat::Plain => {
                    for suggestion in &suggestions {
                        println!("{}\t{}", suggestion.citekey, suggestion.title);
                    }
                }
                _ => {
                    let mut table = new_table(vec!["Key", "Title"]);
                    for suggestion in &suggestions {
                        table.add_row(vec![
                            suggestion.citekey.clone(),
                            ui::truncate_with_ellipsis(&suggestion.title, 70),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }

        Commands::Cite {
            library_id,
            keys,
            format,
        } => {
            let services = Services::new(&config)?;
            let text =
                with_retry(retry, || services.exporter.export_keys(&keys, format, library_id))
                    .await?;
            println!("{}", text.trim_end());
        }
    }

    Ok(())
}

fn run_config(command: ConfigCommands, config: &Config, quiet: bool) -> Result<()> {
    match command {
        ConfigCommands::Init { path, force } => {
            let path = path
                .or_else(default_config_path)
                .context("could not determine a config directory; pass a path")?;
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }

            Config::default().save(&path)?;
            if !quiet {
                ui::print_status(
                    Status::Success,
                    &format!("Wrote default configuration to {}", path.display()),
                );
            }
        }
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
    }

    Ok(())
}

fn new_table(header: Vec<&str>) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(header);
    table
}

fn output_view(view: &ReferenceView, output: OutputFormat, annotations: bool, quiet: bool) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(view)?),
        OutputFormat::Plain => {
            for item in &view.items {
                println!("{}\t{}\t{}", item.citekey, item.title, item.venue_line());
                if !annotations {
                    continue;
                }
                let Some(open) = &item.open_link else { continue };
                for quote in item
                    .annotations
                    .iter()
                    .filter_map(|a| a.quote(&item.citekey, open))
                {
                    println!("{}", quote);
                }
            }
        }
        _ => {
            if !quiet {
                ui::print_section(&view.mode.to_string());
            }
            if annotations {
                for item in &view.items {
                    ui::print_item(item, true);
                    println!();
                }
            } else if !view.items.is_empty() {
                use comfy_table::{Attribute, Cell};
                let mut table = new_table(vec!["Key", "Title", "Journal", "Year", "Notes"]);
                for item in &view.items {
                    table.add_row(vec![
                        Cell::new(&item.citekey),
                        Cell::new(ui::truncate_with_ellipsis(&item.title, 50))
                            .add_attribute(Attribute::Bold),
                        Cell::new(ui::truncate_with_ellipsis(&item.journal, 30)),
                        Cell::new(&item.year),
                        Cell::new(item.annotations.len()),
                    ]);
                }
                println!("{table}");
            }
        }
    }

    match view.state {
        ViewState::Failed(_) => anyhow::bail!("{}", view.state.message()),
        ViewState::Ready => {}
        state if !quiet && output != OutputFormat::Json => ui::print_view_state(state),
        _ => {}
    }

    Ok(())
}
