use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use cinecorr::config::Config;
use cinecorr::pipeline::{self, Stage};
use cinecorr::recommend::RankOptions;

#[derive(Parser, Debug)]
#[command(name = "cinecorr")]
#[command(about = "Movie recommendations from rating correlations", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "params.yaml")]
    config: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join the movie catalog with the rating events
    Ingest,
    /// Build and fill the user x movie ratings matrix
    Preprocess,
    /// Compute the movie similarity matrix
    Features,
    /// Run ingest, preprocess and features in order
    Run,
    /// Serve recommendations over HTTP
    Serve,
    /// Print recommendations for one movie
    Recommend {
        #[arg(long)]
        movie: String,
        #[arg(long)]
        rating: f64,
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(long)]
        exclude_seed: bool,
        /// Also save the list as CSV
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(config: &Config) -> std::io::Result<()> {
    let default_filter = if config.debug_logs {
        "cinecorr=debug,tower_http=debug"
    } else {
        "cinecorr=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    });

    if let Some(path) = config.log_path() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = Mutex::new(File::create(&path)?);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file);
        layers.push(if config.log_json {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    tracing_subscriber::registry().with(layers).with(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    config.debug_logs = args.debug;

    if let Err(e) = init_logging(&config) {
        eprintln!("Error: failed to set up logging: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Using config file: {}", args.config);

    let result: Result<(), cinecorr::Error> = match args.command {
        Command::Ingest => pipeline::run_stage(&config, Stage::Ingest).map(|_| ()).map_err(Into::into),
        Command::Preprocess => pipeline::run_stage(&config, Stage::Preprocess)
            .map(|_| ())
            .map_err(Into::into),
        Command::Features => pipeline::run_stage(&config, Stage::Features)
            .map(|_| ())
            .map_err(Into::into),
        Command::Run => pipeline::run_all(&config).map(|_| ()).map_err(Into::into),
        Command::Serve => cinecorr::serve(config).await,
        Command::Recommend {
            movie,
            rating,
            k,
            exclude_seed,
            output,
        } => {
            let mut options = RankOptions::from(&config.prediction);
            if let Some(k) = k {
                options.k = k;
            }
            options.exclude_seed |= exclude_seed;
            cinecorr::recommend_once(&config, &movie, rating, &options, output.as_deref()).map(
                |recommendations| {
                    println!("Top {} recommendations for {}:", recommendations.len(), movie);
                    for r in recommendations {
                        println!("{:>10.6}  {}", r.score, r.movie);
                    }
                },
            )
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
