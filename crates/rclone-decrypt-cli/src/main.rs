//! rclone-decrypt command-line interface: decrypt rclone crypt files that were
//! downloaded from a remote, using the local rclone configuration.

use anyhow::{bail, ensure, Context, Result};
use clap::{ArgAction, Parser};
use log::{info, warn};
use rclone_decrypt_core::{
    logging, CancelToken, CopyStatus, DecryptError, DecryptReport, DecryptRequest,
    DecryptSettings, Decryptor,
};
use rclone_decrypt_rclone::SystemRclone;
use std::path::PathBuf;
use tokio::{select, signal, task};

const EXIT_INTERRUPTED: i32 = 130;

/// Command-line options.
#[derive(Parser, Debug)]
#[command(
    name = "rclone-decrypt",
    version,
    about = "Decrypt files encrypted by an rclone crypt remote without uploading them again."
)]
struct Cli {
    /// rclone config file; defaults to rclone's own location ($RCLONE_CONFIG or ~/.config/rclone/rclone.conf).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directories or files to decrypt.
    #[arg(short, long, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Output directory for decrypted files; defaults to <downloads>/rclone-decrypted.
    #[arg(short, long, alias = "output_dir")]
    output_dir: Option<PathBuf>,

    /// Settings file (TOML or YAML); defaults to $RCLONE_DECRYPT_SETTINGS or the per-user settings.toml.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Kill any single rclone invocation that runs longer than this.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the adapted config and the crypt remotes it defines, then exit.
    #[arg(long)]
    show_config: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

/// Entry point: parse arguments and surface errors with an exit code.
#[tokio::main(flavor = "multi_thread", worker_threads = 1)]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.log_level());

    let mut settings = DecryptSettings::load_or_default(cli.settings.as_deref())
        .context("failed to load rclone-decrypt settings")?;
    if let Some(path) = &settings.path {
        info!("loaded settings from {}", path.display());
    }
    if let Some(secs) = cli.timeout_secs {
        ensure!(secs > 0, "--timeout-secs must be greater than 0");
        settings.rclone.timeout_secs = secs;
    }

    if cli.files.is_empty() && !cli.show_config {
        bail!("--files is required: pass the directory or file to decrypt");
    }

    let cancel = CancelToken::new();
    let tool = SystemRclone::from_settings(&settings, cancel.clone())?;
    let decryptor = Decryptor::new(tool, cancel.clone());

    let rclone_config = cli
        .config
        .clone()
        .unwrap_or_else(|| settings.rclone_config_path());

    if cli.show_config {
        let (adapted, candidates) = decryptor
            .preview(&rclone_config)
            .with_context(|| format!("failed to adapt {}", rclone_config.display()))?;
        println!("# adapted from {}", rclone_config.display());
        print!("{}", adapted.contents());
        println!("# crypt remotes: {}", candidates.len());
        for candidate in candidates {
            println!("{candidate}");
        }
        return Ok(0);
    }

    let output_dir = match cli.output_dir.clone() {
        Some(dir) => dir,
        None => {
            let dir = settings.output_dir();
            info!(
                "No output directory specified. Defaulting to: {}",
                dir.display()
            );
            dir
        }
    };

    let requests: Vec<DecryptRequest> = cli
        .files
        .iter()
        .map(|target| DecryptRequest {
            target: target.clone(),
            rclone_config: rclone_config.clone(),
            output_dir: output_dir.clone(),
        })
        .collect();

    let mut work = task::spawn_blocking(move || decrypt_all(&decryptor, &requests));
    loop {
        select! {
            joined = &mut work => {
                return joined.context("decrypt worker panicked")?;
            }
            received = signal::ctrl_c() => {
                received.context("failed to listen for Ctrl-C")?;
                warn!("interrupt received; stopping rclone and moving files back");
                cancel.cancel();
            }
        }
    }
}

/// Decrypt each request in turn; returns the process exit code.
fn decrypt_all(decryptor: &Decryptor<SystemRclone>, requests: &[DecryptRequest]) -> Result<i32> {
    let mut failures = 0usize;

    for request in requests {
        match decryptor.decrypt(request) {
            Ok(report) => {
                print_report(&report);
                if report.interrupted {
                    println!("\n\tterminated rclone copy!");
                    return Ok(EXIT_INTERRUPTED);
                }
            }
            Err(err @ DecryptError::Stranded { .. }) => {
                return Err(err).context("decrypted target could not be restored");
            }
            Err(DecryptError::Interrupted) => {
                println!("\n\tterminated rclone copy!");
                return Ok(EXIT_INTERRUPTED);
            }
            Err(err) => {
                failures += 1;
                eprintln!("error: {}: {err}", request.target.display());
            }
        }
    }

    Ok(if failures == 0 { 0 } else { 1 })
}

fn print_report(report: &DecryptReport) {
    println!(
        "{} -> {}",
        report.target.display(),
        report.output_dir.display()
    );
    if report.outcomes.is_empty() && !report.interrupted {
        println!("  [WARN] no crypt remotes in the rclone config; nothing was decrypted");
        return;
    }
    for outcome in &report.outcomes {
        let (tag, detail) = status_line(&outcome.status);
        match detail {
            Some(detail) => println!("  [{tag}] {}: {detail}", outcome.candidate),
            None => println!("  [{tag}] {}", outcome.candidate),
        }
    }
    println!(
        "  {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
    if !report.any_success() && !report.interrupted {
        println!("  [WARN] no crypt remote could decrypt the target; check passwords and salts");
    }
}

/// Short tag and optional detail for a copy outcome.
fn status_line(status: &CopyStatus) -> (&'static str, Option<&str>) {
    match status {
        CopyStatus::Succeeded => ("OK", None),
        CopyStatus::Failed { diagnostic, .. } => ("FAIL", Some(diagnostic.as_str())),
        CopyStatus::TimedOut { diagnostic } => ("TIMEOUT", Some(diagnostic.as_str())),
        CopyStatus::Errored { diagnostic } => ("ERROR", Some(diagnostic.as_str())),
        CopyStatus::Cancelled => ("STOP", None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_log_levels() {
        let cli = Cli::parse_from(["rclone-decrypt", "-vv", "--files", "x"]);
        assert_eq!(cli.log_level(), "trace");
        let cli = Cli::parse_from(["rclone-decrypt", "-q", "--files", "x"]);
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn launch_errors_are_tagged_apart_from_failures() {
        let failed = CopyStatus::Failed {
            exit_code: Some(1),
            diagnostic: "bad password".into(),
        };
        let errored = CopyStatus::Errored {
            diagnostic: "could not run rclone".into(),
        };
        assert_eq!(status_line(&failed), ("FAIL", Some("bad password")));
        assert_eq!(status_line(&errored), ("ERROR", Some("could not run rclone")));
    }

    #[test]
    fn several_targets_can_be_given() {
        let cli = Cli::parse_from(["rclone-decrypt", "--files", "a", "b", "--output-dir", "/o"]);
        assert_eq!(cli.files, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(cli.output_dir, Some(PathBuf::from("/o")));
    }
}
