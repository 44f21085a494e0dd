use anyhow::Result;
use clap::Parser;
use colored::*;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use zipvfs::archive::FormatCodec;
use zipvfs::cache::{ArchiveCache, CacheConfig};
use zipvfs::s3::S3Client;
use zipvfs::shell::ShellState;
use zipvfs::source::{RoutingSource, S3Source, location_from_arg};
use zipvfs::ui::create_spinner;

#[derive(Parser, Debug)]
#[command(name = "zipvfs")]
#[command(version)]
#[command(about = "Browse zip and tar archives through an in-memory cache", long_about = None)]
struct Args {
    /// Archive to open: local path, file:// URL or s3://bucket/key
    #[arg(value_name = "ARCHIVE")]
    archive: String,

    /// Evict an archive after this many idle milliseconds (0 = never)
    #[arg(long, value_name = "MS", default_value_t = 60_000)]
    ttl_ms: u64,

    /// Release decoded contents after this many idle milliseconds, keeping the archive id
    #[arg(long, value_name = "MS")]
    contents_ttl_ms: Option<u64>,

    /// Cache name shown in the prompt and in logs
    #[arg(long, default_value = "zipvfs")]
    name: String,
}

impl Args {
    fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            name: self.name.clone(),
            ttl: Duration::from_millis(self.ttl_ms),
            contents_ttl: self.contents_ttl_ms.map(Duration::from_millis),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let location = location_from_arg(&args.archive)?;

    let mut source = RoutingSource::new();
    if location.scheme() == "s3" {
        let client = match S3Client::new().await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                eprintln!("{} Failed to initialize S3 client: {}", "Error:".red().bold(), e);
                eprintln!("Make sure you have valid AWS credentials configured.");
                std::process::exit(1);
            }
        };
        source = source.register(Arc::new(S3Source::new(client)));
    }

    let cache = ArchiveCache::with_collaborators(
        args.cache_config(),
        Arc::new(source),
        Arc::new(FormatCodec::new()),
    );

    let spinner = create_spinner(&format!("Loading {location}..."));
    let opened = ShellState::new(cache, location).await;
    spinner.finish_and_clear();

    let mut state = match opened {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!("{}", "=".repeat(60).cyan());
    println!("{}", "  zipvfs - archive browser".bold().cyan());
    println!("  {}", state.location().as_str().cyan());
    println!("{}", "=".repeat(60).cyan());
    println!();
    println!("Type 'help' for available commands or 'exit' to quit");
    println!();

    let mut rl = DefaultEditor::new()?;

    let history_file = dirs::home_dir().map(|mut p| {
        p.push(".zipvfs_history");
        p
    });

    if let Some(path) = &history_file {
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = state.prompt();

        match rl.readline(&prompt) {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());

                if let Err(e) = state.execute(&line).await {
                    if e.to_string() == "exit" {
                        break;
                    }
                    eprintln!("{} {:#}", "Error:".red().bold(), e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("exit");
                break;
            }
            Err(err) => {
                eprintln!("{} {:?}", "Error:".red().bold(), err);
                break;
            }
        }
    }

    if let Some(path) = &history_file {
        let _ = rl.save_history(path);
    }

    println!("Goodbye!");
    Ok(())
}
