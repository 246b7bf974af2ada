use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lineage_graph::{
    config::Config,
    lineage::{
        GenerationPolicy, GridOptions, JsonFileFetcher, Lineage, LineageCache, LineageGrid, LineageOverrides,
        LineageOptions,
    },
    types::{FilterValue, LineageDirection, LineageFilter},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lineage")]
#[command(about = "Filter, compact and flatten provenance lineage graphs")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Provenance JSON file, or directory of <seed>.json files
    #[arg(short, long, env = "LINEAGE_DATA_PATH")]
    source: Option<PathBuf>,

    /// Maximum generations fetched in each direction
    #[arg(short, long)]
    max_depth: Option<usize>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Parent,
    Children,
}

impl From<DirectionArg> for LineageDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Parent => LineageDirection::Parent,
            DirectionArg::Children => LineageDirection::Children,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GenerationsArg {
    Nearest,
    Specific,
    Multi,
    All,
}

impl From<GenerationsArg> for GenerationPolicy {
    fn from(arg: GenerationsArg) -> Self {
        match arg {
            GenerationsArg::Nearest => GenerationPolicy::Nearest,
            GenerationsArg::Specific => GenerationPolicy::Specific,
            GenerationsArg::Multi => GenerationPolicy::Multi,
            GenerationsArg::All => GenerationPolicy::All,
        }
    }
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Field filter as `field` (presence), `field=value` or `field=a,b`
    #[arg(short, long = "filter")]
    filters: Vec<String>,

    /// Remove matching nodes instead of keeping them
    #[arg(long)]
    exclude: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the compacted renderer graph
    Graph {
        /// Seed node id (defaults to the seed of a single source file)
        #[arg(long)]
        seed: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,

        /// Generation stop policy
        #[arg(short, long, value_enum)]
        generations: Option<GenerationsArg>,

        /// Fan-out at which siblings are combined (0 disables)
        #[arg(long)]
        combine_size: Option<usize>,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },

    /// Flatten the lineage into paged grid rows
    Walk {
        #[arg(long)]
        seed: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,

        #[arg(short, long, value_enum, default_value = "children")]
        direction: DirectionArg,

        /// Maximum distance from the seed
        #[arg(long)]
        distance: Option<usize>,

        /// 1-based page number
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Print the filtered lineage result
    Filter {
        #[arg(long)]
        seed: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Merge the lineage of other seeds into one entry
    Merge {
        #[arg(long)]
        seed: Option<String>,

        /// Seeds whose lineage is folded in
        #[arg(short, long = "with", required = true)]
        with: Vec<String>,
    },

    /// Print derived statistics
    Stats {
        #[arg(long)]
        seed: Option<String>,
    },

    /// Initialize configuration file
    Init {
        /// Configuration file path
        #[arg(short, long, default_value = "lineage.yml")]
        config_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level)?;

    let mut config = load_config(cli.config.as_ref()).await?;
    if let Some(source) = cli.source {
        config.fetch.data_path = Some(source);
    }
    if let Some(max_depth) = cli.max_depth {
        config.fetch.max_depth = max_depth;
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Graph {
            seed,
            filter,
            generations,
            combine_size,
            output_file,
        } => {
            let mut overrides = filter_overrides(&filter)?;
            if generations.is_some() || combine_size.is_some() {
                let mut grouping = config.lineage.grouping.clone();
                if let Some(generations) = generations {
                    grouping.generations = generations.into();
                }
                if let Some(size) = combine_size {
                    grouping.combine_size = (size > 0).then_some(size);
                }
                overrides.grouping = Some(grouping);
            }
            let options = options_from(&config, overrides);

            let lineage = load_lineage(&config, seed).await?;
            let graph = lineage
                .generate_graph(&options)
                .with_context(|| format!("Failed to build graph for {}", lineage.seed))?;

            write_output(&graph.to_json()?, output_file.as_ref()).await?;
        }

        Commands::Walk {
            seed,
            filter,
            direction,
            distance,
            page,
            output,
        } => {
            let options = options_from(&config, filter_overrides(&filter)?);
            let grid_options = GridOptions {
                direction: direction.into(),
                distance: distance.unwrap_or(config.grid.distance),
                page_size: config.grid.page_size,
            };

            let lineage = load_lineage(&config, seed).await?;
            let grid = lineage.grid(&options, &grid_options)?;
            let content = match output.to_lowercase().as_str() {
                "json" => serde_json::to_string_pretty(grid.page(page, grid_options.page_size))?,
                "text" => format_grid(&grid, page, grid_options.page_size),
                _ => {
                    warn!("Unknown output format '{}', using text", output);
                    format_grid(&grid, page, grid_options.page_size)
                }
            };
            write_output(&content, None).await?;
        }

        Commands::Filter { seed, filter } => {
            let options = options_from(&config, filter_overrides(&filter)?);
            let lineage = load_lineage(&config, seed).await?;
            let filtered = lineage.filter_result(&options)?;
            if filtered.seed_node().is_none() {
                warn!("Seed {} was removed by the filters", filtered.seed);
            }
            write_output(&serde_json::to_string_pretty(&filtered)?, None).await?;
        }

        Commands::Merge { seed, with } => {
            let (cache, fetcher) = open_source(&config)?;
            let seed = resolve_seed(&fetcher, seed).await?;
            cache.load(&seed, config.fetch.max_depth, &fetcher).await;

            let mut merged = None;
            for other in &with {
                let entry = cache.load(other, config.fetch.max_depth, &fetcher).await;
                match entry.result() {
                    Ok(result) => merged = Some(cache.merge(&seed, result).await),
                    Err(e) => warn!("Skipping {}: {}", other, e),
                }
            }

            match merged.or(cache.get(&seed).await) {
                Some(entry) => write_output(&serde_json::to_string_pretty(&*entry)?, None).await?,
                None => anyhow::bail!("No lineage available for {}", seed),
            }
        }

        Commands::Stats { seed } => {
            let lineage = load_lineage(&config, seed).await?;
            let statistics = lineage
                .statistics
                .as_ref()
                .context("Lineage has no statistics")?;
            write_output(&serde_json::to_string_pretty(statistics)?, None).await?;
        }

        Commands::Init { config_file } => {
            init_config(config_file).await?;
        }
    }

    Ok(())
}

/// Initialize tracing with the specified log level
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to create env filter")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}

/// Load configuration from file, then environment, or use defaults
async fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(path) = config_path {
        if path.exists() {
            info!("Loading configuration from: {:?}", path);
            config = Config::load_from_file(path)
                .await
                .with_context(|| format!("Failed to load configuration file: {:?}", path))?;
        } else {
            warn!("Configuration file not found: {:?}. Using defaults.", path);
        }
    }

    config.merge_with(Config::load_from_env().context("Invalid LINEAGE_* environment variable")?);
    Ok(config)
}

fn open_source(config: &Config) -> Result<(LineageCache, JsonFileFetcher)> {
    let path = config
        .fetch
        .data_path
        .as_ref()
        .context("No provenance source given. Use --source or LINEAGE_DATA_PATH")?;
    let cache = LineageCache::new(&config.cache)?;
    Ok((cache, JsonFileFetcher::new(path)))
}

async fn resolve_seed(fetcher: &JsonFileFetcher, seed: Option<String>) -> Result<String> {
    match seed {
        Some(seed) => Ok(seed),
        None => fetcher
            .read_seed()
            .await
            .context("No --seed given and the source is not a single provenance file"),
    }
}

async fn load_lineage(config: &Config, seed: Option<String>) -> Result<Arc<Lineage>> {
    let (cache, fetcher) = open_source(config)?;
    let seed = resolve_seed(&fetcher, seed).await?;
    let lineage = cache.load(&seed, config.fetch.max_depth, &fetcher).await;

    if let Some(error) = &lineage.error {
        anyhow::bail!("Failed to load lineage for {}: {}", seed, error);
    }
    Ok(lineage)
}

fn options_from(config: &Config, overrides: LineageOverrides) -> LineageOptions {
    let mut options = config.lineage.clone();
    options.apply(&overrides);
    options
}

fn filter_overrides(args: &FilterArgs) -> Result<LineageOverrides> {
    let mut overrides = LineageOverrides::default();
    if !args.filters.is_empty() {
        let filters = args
            .filters
            .iter()
            .map(|raw| parse_filter(raw))
            .collect::<Result<Vec<_>>>()?;
        overrides.filters = Some(filters);
    }
    if args.exclude {
        overrides.filter_in = Some(false);
    }
    Ok(overrides)
}

/// `field`, `field=value` or `field=a,b`. Values that parse as JSON keep their type.
fn parse_filter(raw: &str) -> Result<LineageFilter> {
    let (field, value) = match raw.split_once('=') {
        Some((field, value)) => (field.trim(), Some(value.trim())),
        None => (raw.trim(), None),
    };
    if field.is_empty() {
        anyhow::bail!("Filter '{}' has no field name", raw);
    }

    let parse_value =
        |v: &str| serde_json::from_str(v).unwrap_or_else(|_| serde_json::Value::String(v.to_string()));
    let value = match value {
        None => FilterValue::Any,
        Some(v) if v.contains(',') => FilterValue::OneOf(v.split(',').map(|p| parse_value(p.trim())).collect()),
        Some(v) => FilterValue::Equals(parse_value(v)),
    };

    Ok(LineageFilter::new(field, value))
}

fn format_grid(grid: &LineageGrid, page: usize, page_size: usize) -> String {
    let mut lines = vec![format!(
        "Lineage of {} ({:?}), page {} of {}, {} rows",
        grid.seed,
        grid.direction,
        page,
        grid.page_count(page_size),
        grid.total_rows()
    )];

    for row in grid.page(page, page_size) {
        let mut badges = Vec::new();
        if row.is_seed {
            badges.push("seed".to_string());
        }
        if row.duplicates > 0 {
            badges.push(format!("{} duplicates", row.duplicates));
        }
        lines.push(format!(
            "{:>3}  {:<40}  {:<16}  {}",
            row.distance,
            row.node.display_name(),
            row.node.node_type,
            badges.join(", ")
        ));
    }

    lines.join("\n")
}

async fn write_output(content: &str, output_file: Option<&PathBuf>) -> Result<()> {
    if let Some(file_path) = output_file {
        tokio::fs::write(file_path, content)
            .await
            .with_context(|| format!("Failed to write output to: {:?}", file_path))?;
        info!("Output written to: {:?}", file_path);
    } else {
        println!("{}", content);
    }
    Ok(())
}

/// Initialize configuration file
async fn init_config(config_file: PathBuf) -> Result<()> {
    info!("Initializing configuration file: {:?}", config_file);

    if config_file.exists() {
        warn!("Configuration file already exists: {:?}", config_file);
        print!("Overwrite existing file? (y/N): ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            info!("Configuration initialization cancelled");
            return Ok(());
        }
    }

    Config::default()
        .save_to_file(&config_file)
        .await
        .with_context(|| format!("Failed to write configuration file: {:?}", config_file))?;

    info!("Configuration file created successfully: {:?}", config_file);
    println!("Configuration file created: {:?}", config_file);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter("type").unwrap().value, FilterValue::Any);
        assert_eq!(parse_filter("type=Sample").unwrap(), LineageFilter::new("type", "Sample"));
        assert_eq!(
            parse_filter("batch=7").unwrap().value,
            FilterValue::Equals(json!(7))
        );
        assert_eq!(
            parse_filter("type=Sample, Data").unwrap().value,
            FilterValue::OneOf(vec![json!("Sample"), json!("Data")])
        );
        assert!(parse_filter("=x").is_err());
    }
}
