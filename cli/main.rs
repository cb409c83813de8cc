use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ofencrypt::{
    config, engine::FileCrypter, keygen, CryptError, Direction, JobObserver, Mode, ProcessingJob,
    Summary,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use zeroize::Zeroizing;

/// ofencrypt - Password-based file and directory encryption (AES-256-CBC)
#[derive(Parser)]
#[command(name = "ofencrypt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file, or every file under a directory
    Encrypt {
        /// File or directory to encrypt
        path: PathBuf,

        /// Treat PATH as a directory and encrypt it recursively
        #[arg(short, long)]
        directory: bool,

        /// Read the password from this file
        #[arg(short, long, conflicts_with = "generate_key")]
        key_file: Option<PathBuf>,

        /// Generate a random key and use it as the password
        #[arg(short, long)]
        generate_key: bool,

        /// Save the generated key to this file
        #[arg(short, long, requires = "generate_key")]
        save_key: Option<PathBuf>,
    },

    /// Decrypt a container, or every container under a directory
    Decrypt {
        /// Container file or directory to decrypt
        path: PathBuf,

        /// Treat PATH as a directory and decrypt it recursively
        #[arg(short, long)]
        directory: bool,

        /// Read the password from this file
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// Generate a random 256-bit key
    Keygen {
        /// Write the key to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Use RUST_LOG environment variable to control log level (e.g., RUST_LOG=info,ofencrypt=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "ofencrypt starting");

    let cfg = config::Config::load_with_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Encrypt {
            path,
            directory,
            key_file,
            generate_key,
            save_key,
        } => {
            let password = if generate_key {
                generated_password(save_key.as_deref()).await?
            } else {
                read_password(key_file.as_deref(), &cfg).await?
            };
            cmd_run(&cfg, path, directory, Direction::Encrypt, password).await
        }

        Commands::Decrypt {
            path,
            directory,
            key_file,
        } => {
            let password = read_password(key_file.as_deref(), &cfg).await?;
            cmd_run(&cfg, path, directory, Direction::Decrypt, password).await
        }

        Commands::Keygen { output } => cmd_keygen(output.as_deref()).await,
    }
}

/// Progress bar that doubles as the job observer
struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    fn new(verb: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message(verb.to_string());
        Self { bar }
    }
}

impl JobObserver for BarObserver {
    fn item_started(&mut self, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(name);
    }

    fn progress(&mut self, processed: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(processed as u64);
    }

    fn item_failed(&mut self, reason: &'static str, cause: &CryptError) {
        self.bar.println(format!("  failed [{}]: {}", reason, cause));
    }
}

async fn cmd_run(
    cfg: &config::Config,
    path: PathBuf,
    directory: bool,
    direction: Direction,
    password: Zeroizing<String>,
) -> Result<()> {
    let crypter = FileCrypter::new(cfg);
    let mode = if directory { Mode::Directory } else { Mode::SingleFile };
    let verb = match direction {
        Direction::Encrypt => "Encrypting",
        Direction::Decrypt => "Decrypting",
    };

    let display = path.display().to_string();
    let job = ProcessingJob::new(path, mode, direction, password.as_str());
    let mut observer = BarObserver::new(verb);

    let summary = job
        .run(&crypter, &mut observer)
        .await
        .with_context(|| format!("{} {}", verb.to_lowercase(), display))?;
    observer.bar.finish_with_message("done");

    report(&summary, direction)
}

fn report(summary: &Summary, direction: Direction) -> Result<()> {
    let verb = match direction {
        Direction::Encrypt => "encrypted",
        Direction::Decrypt => "decrypted",
    };
    println!("{} of {} file(s) {}", summary.succeeded, summary.total, verb);

    if !summary.is_success() {
        println!();
        println!("Failures:");
        for failure in &summary.failures {
            println!("  {} [{}]: {}", failure.path.display(), failure.reason, failure.message);
        }
        anyhow::bail!("{} file(s) could not be {}", summary.failed(), verb);
    }
    Ok(())
}

async fn generated_password(save_to: Option<&Path>) -> Result<Zeroizing<String>> {
    let key = keygen::generate_key();
    match save_to {
        Some(path) => {
            keygen::save_key_file(path, &key).await?;
            println!("Generated key saved to {}", path.display());
        }
        None => {
            println!("Generated key: {}", key.as_str());
            println!("IMPORTANT: Store this key safely. Without it, your files cannot be recovered.");
        }
    }
    Ok(key)
}

async fn read_password(key_file: Option<&Path>, cfg: &config::Config) -> Result<Zeroizing<String>> {
    let key_file = key_file
        .map(Path::to_path_buf)
        .or_else(|| cfg.key_file.as_ref().map(PathBuf::from));

    if let Some(path) = key_file {
        return Ok(keygen::load_key_file(&path).await?);
    }

    print!("Password: ");
    io::stdout().flush()?;
    let mut line = Zeroizing::new(String::new());
    io::stdin().read_line(&mut line)?;
    let password = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    if password.is_empty() {
        anyhow::bail!("password cannot be empty");
    }
    Ok(password)
}

async fn cmd_keygen(output: Option<&Path>) -> Result<()> {
    let key = keygen::generate_key();
    match output {
        Some(path) => {
            keygen::save_key_file(path, &key).await?;
            println!("Key written to {}", path.display());
        }
        None => println!("{}", key.as_str()),
    }
    Ok(())
}
