use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::SystemTime;

use axum::http::StatusCode;
use edge_optimizer::cache::{CacheKey, PolicyTable};
use edge_optimizer::classify::{Classification, Classifier, PathClass};
use edge_optimizer::config::{load_config, EdgeConfig, RewriteMode};
use edge_optimizer::rewrite::HtmlRewriter;

#[derive(Parser)]
#[command(name = "edge-cli")]
#[command(about = "Offline inspection tool for the edge optimizer", long_about = None)]
struct Cli {
    /// Configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a URL and show its cache key
    Classify {
        url: String,
        #[arg(long, default_value = "text/html; charset=UTF-8")]
        content_type: String,
        #[arg(long, default_value_t = 200)]
        status: u16,
    },
    /// Run the rewrite pipeline over a local HTML file
    Rewrite {
        file: PathBuf,
        /// Rewrite as a logged-in visitor would see it
        #[arg(long)]
        logged_in: bool,
        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },
    /// Show the header policy for a path
    Policy { path: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Stream,
    Body,
    Both,
}

impl From<Mode> for RewriteMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Stream => RewriteMode::Stream,
            Mode::Body => RewriteMode::Body,
            Mode::Both => RewriteMode::Both,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EdgeConfig::default(),
    };

    match cli.command {
        Commands::Classify {
            url,
            content_type,
            status,
        } => {
            let classifier = Classifier::from_config(&config.classify);
            let status = StatusCode::from_u16(status)?;
            let class = classifier.classify_url(&url, Some(&content_type), status);
            println!("classification: {class}");

            let key = url::Url::parse(&url).ok().and_then(|parsed| match &class {
                Classification::ImmutableAsset(_) | Classification::MutableAsset(_) => {
                    Some(CacheKey::for_asset(&parsed))
                }
                Classification::HtmlCandidate => Some(CacheKey::for_document(&parsed)),
                _ => None,
            });
            match key {
                Some(key) => println!("cache key: {key}"),
                None => println!("cache key: none (not cached)"),
            }
        }
        Commands::Rewrite {
            file,
            logged_in,
            mode,
        } => {
            if let Some(mode) = mode {
                config.rewrite.mode = mode.into();
            }
            let html = std::fs::read_to_string(&file)?;
            let rewriter = HtmlRewriter::from_config(&config.rewrite)?;
            print!("{}", rewriter.rewrite(&html, logged_in)?);
        }
        Commands::Policy { path } => {
            let classifier = Classifier::from_config(&config.classify);
            let table = PolicyTable::new(config.policy.clone());
            let policy = match classifier.classify_request(&path) {
                PathClass::Asset(class) => {
                    println!("class: {class}");
                    table.for_class(&class)
                }
                PathClass::Admin => {
                    println!("class: {}", Classification::AdminExcluded);
                    None
                }
                PathClass::Document => {
                    println!("class: html document (when the origin answers 200 text/html)");
                    Some(table.for_html())
                }
            };

            match policy {
                Some(policy) => {
                    println!("cache-control: {}", policy.cache_control());
                    println!("cdn-cache-control: {}", policy.cdn_cache_control());
                    if let Some(expires) = policy.expires(SystemTime::now()) {
                        println!("expires: {expires}");
                    }
                    println!("vary: {}", policy.vary);
                }
                None => println!("no policy: passed through, never cached"),
            }
        }
    }

    Ok(())
}
