#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod config;
mod exit_code;
mod output;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hushvault_core::store::{STORE_FILE_NAME, StoreError};
use hushvault_core::{FileStore, Vault, VaultError, VaultState};

use crate::commands::{add, completions, destroy, edit, init, list, passwd, rm, show, status};
use crate::config::Config;

/// Command-line interface for hushvault encrypted journals
#[derive(Parser)]
#[command(name = "hushvault")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Create a vault (prompts for a password twice)
    hushvault init

    # Add an entry from stdin
    echo \"dear diary\" | hushvault add --title \"Monday\"

    # List entries (works without the password)
    hushvault list

    # Read an entry, piping the password from a secret manager
    echo \"$SECRET\" | hushvault --password-stdin show 3f2a9c1e
")]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Vault directory
    #[arg(long, env = "HUSHVAULT_DIR", value_name = "DIR", global = true)]
    vault: Option<PathBuf>,

    /// Vault password (insecure, prefer --password-stdin or HUSHVAULT_PASSWORD)
    #[arg(long, env = "HUSHVAULT_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Read password from stdin (first line)
    #[arg(long, conflicts_with = "password", global = true)]
    password_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Password options extracted from CLI for vault operations
#[derive(Clone, Default)]
pub struct PasswordOptions {
    pub password: Option<String>,
    pub password_stdin: bool,
}

impl From<&Cli> for PasswordOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            password: cli.password.clone(),
            password_stdin: cli.password_stdin,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault and set its password
    Init(init::Args),

    /// Show whether the vault exists and how it is protected
    Status(status::Args),

    /// Add an entry
    Add(add::Args),

    /// List entries (no password needed)
    List(list::Args),

    /// Decrypt and print an entry
    Show(show::Args),

    /// Replace an entry's title or content
    Edit(edit::Args),

    /// Delete an entry
    Rm(rm::Args),

    /// Change the vault password, re-encrypting every entry
    Passwd(passwd::Args),

    /// Remove the password and permanently delete every entry
    Destroy(destroy::Args),

    /// Generate shell completions
    Completions(completions::Args),
}

/// Everything a command needs to reach the vault
pub struct Context {
    pub vault_dir: PathBuf,
    pub config: Config,
    pub password_opts: PasswordOptions,
    pub quiet: bool,
}

impl Context {
    /// Whether a vault document exists in the vault directory.
    pub fn vault_exists(&self) -> bool {
        self.vault_dir.join(STORE_FILE_NAME).exists()
    }

    /// Open the vault without unlocking it.
    pub fn open_vault(&self) -> Result<Vault<FileStore>> {
        let store = FileStore::open(&self.vault_dir)
            .with_context(|| format!("Failed to open vault at {}", self.vault_dir.display()))?;
        Ok(Vault::open(store, self.config.vault.clone())?)
    }

    /// Open an existing vault, failing if none has been initialized.
    pub fn open_existing_vault(&self) -> Result<Vault<FileStore>> {
        if !self.vault_exists() {
            return Err(anyhow::Error::new(VaultError::NoPassword).context(format!(
                "No vault at {}; run `hushvault init` first",
                self.vault_dir.display()
            )));
        }
        let mut vault = self.open_vault()?;
        if vault.state() == VaultState::NoPassword {
            return Err(anyhow::Error::new(VaultError::NoPassword).context(format!(
                "Vault at {} has no password; run `hushvault init`",
                self.vault_dir.display()
            )));
        }
        Ok(vault)
    }

    /// Open and unlock the vault.
    pub fn unlock_vault(&self) -> Result<Vault<FileStore>> {
        let mut vault = self.open_existing_vault()?;
        let password = get_password(&self.password_opts, "Vault password: ")?;
        vault
            .unlock(&password)
            .context("Failed to unlock vault - check your password")?;
        Ok(vault)
    }

    /// Print a status line to stderr unless `--quiet`.
    pub fn note(&self, message: impl std::fmt::Display) {
        if !self.quiet {
            eprintln!("{message}");
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    if !cli.quiet {
        let verbosity = if cli.verbose > 0 {
            cli.verbose
        } else {
            config.defaults.verbosity.unwrap_or(0)
        };
        setup_tracing(verbosity);
    }

    if let Commands::Completions(args) = &cli.command {
        return completions::execute(args);
    }

    let vault_dir = config::resolve_vault_dir(cli.vault.as_deref(), &config)?;
    tracing::debug!(vault = %vault_dir.display(), "Resolved vault directory");

    let ctx = Context {
        vault_dir,
        config,
        password_opts: PasswordOptions::from(&cli),
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::Init(args) => init::execute(&ctx, args),
        Commands::Status(args) => status::execute(&ctx, args),
        Commands::Add(args) => add::execute(&ctx, args),
        Commands::List(args) => list::execute(&ctx, args),
        Commands::Show(args) => show::execute(&ctx, args),
        Commands::Edit(args) => edit::execute(&ctx, args),
        Commands::Rm(args) => rm::execute(&ctx, args),
        Commands::Passwd(args) => passwd::execute(&ctx, args),
        Commands::Destroy(args) => destroy::execute(&ctx, args),
        Commands::Completions(_) => Ok(()),
    }
}

/// Get the password using the priority chain:
/// 1. --password-stdin
/// 2. --password / HUSHVAULT_PASSWORD
/// 3. Interactive prompt
pub fn get_password(opts: &PasswordOptions, prompt: &str) -> Result<String> {
    if opts.password_stdin {
        read_password_from_stdin()
    } else if let Some(ref password) = opts.password {
        Ok(password.clone())
    } else {
        prompt_password(prompt)
    }
}

/// Interactive, non-echoing prompt on the terminal
pub fn prompt_password(prompt: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        anyhow::bail!(
            "No password given and stdin is not a terminal.\n\
             Use --password-stdin, --password or HUSHVAULT_PASSWORD."
        );
    }
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }
    Ok(password)
}

/// Read password from stdin (first line only)
fn read_password_from_stdin() -> Result<String> {
    if io::stdin().is_terminal() {
        anyhow::bail!(
            "--password-stdin requires password to be piped in.\n\
             Example: echo \"$SECRET\" | hushvault --password-stdin show <ID>"
        );
    }

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    let password = password.trim_end_matches('\n').trim_end_matches('\r');

    if password.is_empty() {
        anyhow::bail!("Password from stdin is empty");
    }

    Ok(password.to_string())
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
///
/// This approach is more robust than string matching because it doesn't depend
/// on error message wording, which could change between versions.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(vault_err) = cause.downcast_ref::<VaultError>() {
            match vault_err {
                VaultError::IncorrectPassword => return exit_code::AUTH_FAILED,
                VaultError::WeakPassword(_) => return exit_code::WEAK_PASSWORD,
                VaultError::EntryNotFound { .. } => return exit_code::NOT_FOUND,
                VaultError::DecryptionFailure(_) => return exit_code::INTEGRITY_FAILED,
                VaultError::NoPassword => return exit_code::VAULT_INVALID,
                VaultError::AlreadyExists => return exit_code::USAGE_ERROR,
                _ => {}
            }
        }

        if let Some(store_err) = cause.downcast_ref::<StoreError>() {
            match store_err {
                StoreError::Io { source, .. } => {
                    if source.kind() == io::ErrorKind::PermissionDenied {
                        return exit_code::PERMISSION_DENIED;
                    }
                }
                StoreError::Serialization(_) | StoreError::Corrupt(_) => {
                    return exit_code::VAULT_INVALID;
                }
            }
        }

        if let Some(cancelled) = cause.downcast_ref::<commands::Cancelled>() {
            tracing::debug!(%cancelled, "Operation cancelled");
            return exit_code::CANCELLED;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && io_err.kind() == io::ErrorKind::PermissionDenied
        {
            return exit_code::PERMISSION_DENIED;
        }
    }

    exit_code::GENERAL_ERROR
}
