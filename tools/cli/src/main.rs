//! treevault CLI - edit one node of an encrypted tree in an external program.
//!
//! The vault is decrypted into memory, the node at the given address is handed
//! to the action as a temporary file, and the vault is re-encrypted and written
//! back only if the node changed or the salt is being replaced.

mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use treevault_common::Error;
use treevault_vault::interrupt::{self, EXIT_INTERRUPTED};
use treevault_vault::{operations, Config, ConfigOptions, ShellEditor};

use terminal::{TerminalConfirm, TerminalPasswords};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_AUTHENTICATION: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "treevault")]
#[command(about = "treevault - Edit secrets in an encrypted JSON tree")]
#[command(version)]
struct Cli {
    /// Vault file; created if it does not exist.
    vault: PathBuf,

    /// Keys leading from the root to the node to edit (default: whole tree).
    key: Vec<String>,

    /// Salt the vault is encrypted under.
    #[arg(short, long, conflicts_with = "salt_file")]
    salt: Option<String>,

    /// File holding the salt.
    #[arg(short = 'S', long)]
    salt_file: Option<PathBuf>,

    /// Re-encrypt under a freshly generated salt of this many random bytes.
    #[arg(short = 'n', long, conflicts_with = "new_salt")]
    new_salt_len: Option<usize>,

    /// Re-encrypt under this salt.
    #[arg(long)]
    new_salt: Option<String>,

    /// Where to save the new salt; a generated salt is printed otherwise.
    #[arg(short = 'N', long)]
    new_salt_file: Option<PathBuf>,

    /// Command to run on the temporary file; `{}` stands for its path.
    #[arg(short, long, env = "EDITOR", default_value = "vi")]
    action: String,

    /// Use the salt file contents verbatim instead of trimming whitespace.
    #[arg(long)]
    no_trim_salt: bool,

    /// Directory for the temporary plaintext file.
    #[arg(long)]
    tmpdir: Option<PathBuf>,

    /// Do not fall back to plain text when a new node's edit is not TOML.
    #[arg(long)]
    strict_new_nodes: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(self) -> ConfigOptions {
        ConfigOptions {
            vault_path: self.vault,
            address: self.key,
            salt: self.salt,
            salt_file: self.salt_file,
            new_salt: self.new_salt,
            new_salt_len: self.new_salt_len,
            new_salt_file: self.new_salt_file,
            action: self.action,
            keep_salt_whitespace: self.no_trim_salt,
            temp_dir: self.tmpdir,
            strict_new_nodes: self.strict_new_nodes,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("error: {:#}", err);
        return ExitCode::from(EXIT_FAILURE);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    interrupt::install().context("Failed to set up interrupt handling")?;

    let config = Config::from_options(cli.options())?;
    debug!("Editing {} in {}", config.address, config.vault_path.display());

    let mut editor = ShellEditor::new(config.action.clone(), config.temp_dir.clone());
    let report = operations::run(
        &config,
        &mut TerminalPasswords,
        &mut editor,
        &mut TerminalConfirm,
    )?;

    if let Some(salt) = report.unsaved_salt {
        // The only copy of the salt; without it the vault cannot be opened.
        println!("{}", salt);
    }
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(Error::Config(_)) => EXIT_CONFIG,
        Some(Error::Authentication) => EXIT_AUTHENTICATION,
        Some(e) if e.is_cancellation() => EXIT_INTERRUPTED as u8,
        _ => EXIT_FAILURE,
    }
}
