//! Command-line interface for hollowtar.

pub mod args;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::archive::GzipConfig;
use crate::ext_sort::SortConfig;
use crate::file_system::{FileSystem, OsFileSystem};
use crate::ops::{self, Program};

pub use args::{CompressArgs, ExcludeArgs, SorterArgs};

const EXIT_SUCCESS: i32 = 0;
const EXIT_DIFFS_FOUND: i32 = 1;
const EXIT_FAILURE: i32 = 2;

/// Grace period between an interrupt and a hard exit.
const EXIT_TIMEOUT: Duration = Duration::from_secs(10);

const LONG_ABOUT: &str = "\
hollowtar preserves directory trees as compressed archives, replacing every
file with a zero-byte placeholder. The result is a lightweight tarball that is
portable, navigable in any archive browser, and diffable - a browsable
inventory of e.g. a media library without the weight of its contents.

The program stays efficient even with millions of paths, off-loading excess
data to disk when memory would otherwise become constrained.

All commands print their primary results (paths or differences) to standard
output; errors and operational messages go to standard error.

Exit Codes:
  0 - Success
  1 - Differences found (only for 'diff')
  2 - General failure (invalid input, I/O errors, etc.)";

const CREATE_LONG_ABOUT: &str = "\
Create a tarball representing any given directory tree.

All files and directories under <ROOT> are included recursively; files become
zero-byte placeholder entries with their names preserved.

Exclude patterns are matched relative to <ROOT>: '*' and '?' stay within one
path component, '**' spans components, '[a-z]' classes, '{a,b}' alternation
and '\\'-escapes are supported, and a trailing '/' restricts a pattern to
directories.

Every path written to the tarball is also printed to standard output.";

const CREATE_EXAMPLES: &str = "\
Examples:
  # Archive the current directory:
  hollowtar create . output.tar.gz

  # Archive a directory with exclusions:
  hollowtar create /mnt/data output.tar.gz --exclude='src/**/main.go'

  # Archive a directory with exclusions from a file:
  hollowtar create /mnt/data output.tar.gz --excludes-from=./excludes.txt";

const DIFF_LONG_ABOUT: &str = "\
Create a diff tarball containing only the structural differences between any
two sources.

Each source may be an existing directory or an existing tarball (.tar.gz), so
tar vs. tar, tar vs. dir, dir vs. tar and dir vs. dir all work. Paths present
only in <OLD> land under a synthetic '---' directory, paths present only in
<NEW> under '+++'; the same differences are printed to standard output.

With massive inputs the external sorter spills runs to disk; point --tmpdir
at a fast location with enough free space, or leave it unset to use the
platform default.";

const DIFF_EXAMPLES: &str = "\
Examples:
  # Basic usage of the command:
  hollowtar diff old.tar.gz new.tar.gz diff.tar.gz

  # Compare a snapshot against a live directory:
  hollowtar diff old.tar.gz /mnt/new diff.tar.gz

  # Just see the diff in the terminal (without file output):
  hollowtar diff old.tar.gz new.tar.gz /dev/null

  # Use an on-disk temporary directory (for massive archives):
  hollowtar diff old.tar.gz new.tar.gz diff.tar.gz --tmpdir=/mnt/largedisk";

const LIST_LONG_ABOUT: &str = "\
List all contained paths in a tarball, either sorted or in original order.

Paths are sorted by default, which improves readability and comparability;
--sort=false preserves the original archive order.

With massive inputs the external sorter spills runs to disk; point --tmpdir
at a fast location with enough free space, or leave it unset to use the
platform default.";

const LIST_EXAMPLES: &str = "\
Examples:
  # List the contents as sorted (default):
  hollowtar list input.tar.gz

  # List the contents in their original archive order:
  hollowtar list input.tar.gz --sort=false";

// =============================================================================
// CLI Definition
// =============================================================================

/// hollowtar creates, diffs, and lists directory trees as archives.
#[derive(Parser, Debug)]
#[command(
    name = "hollowtar",
    version,
    about = "Preserve, diff, and list directory trees as placeholder archives",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a tarball representing any given directory tree.
    #[command(long_about = CREATE_LONG_ABOUT, after_help = CREATE_EXAMPLES)]
    Create {
        /// Root directory to package.
        root: PathBuf,
        /// Path of the tarball to create.
        output: PathBuf,

        #[command(flatten)]
        excludes: ExcludeArgs,

        #[command(flatten)]
        compress: CompressArgs,
    },

    /// Create a diff tarball from any two pre-existing sources.
    #[command(long_about = DIFF_LONG_ABOUT, after_help = DIFF_EXAMPLES)]
    Diff {
        /// Old side of the comparison (directory or .tar.gz).
        old: PathBuf,
        /// New side of the comparison (directory or .tar.gz).
        new: PathBuf,
        /// Path of the diff tarball to create.
        output: PathBuf,

        #[command(flatten)]
        excludes: ExcludeArgs,

        /// Level of compression (0: none - 9: highest).
        #[arg(long, value_name = "LEVEL", default_value_t = crate::archive::DEFAULT_COMPRESSION_LEVEL, allow_negative_numbers = true)]
        compression: i32,

        #[command(flatten)]
        sorter: SorterArgs,
    },

    /// List the paths contained in a tarball (sorted by default).
    #[command(long_about = LIST_LONG_ABOUT, after_help = LIST_EXAMPLES)]
    List {
        /// Tarball to list.
        input: PathBuf,

        /// Sort the output list; for better comparability.
        #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
        sort: bool,

        #[command(flatten)]
        sorter: SorterArgs,
    },
}

// =============================================================================
// Execution
// =============================================================================

/// Run the CLI to completion and return the process exit code.
pub async fn run() -> i32 {
    init_tracing();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    spawn_debug_signal_task();

    let op_cancel = cancel.clone();
    let mut operation = tokio::spawn(async move { execute(cli, op_cancel).await });

    tokio::select! {
        result = &mut operation => exit_code(result),

        _ = interrupt_signal() => {
            eprintln!("interrupting...");
            cancel.cancel();

            match tokio::time::timeout(EXIT_TIMEOUT, operation).await {
                Ok(_) => eprintln!("interrupted (exited)"),
                Err(_) => eprintln!("interrupted (killed)"),
            }
            EXIT_FAILURE
        }
    }
}

/// Dispatch the parsed command against the real filesystem.
async fn execute(cli: Cli, cancel: CancellationToken) -> ops::Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem::new());

    match cli.command {
        Command::Create {
            root,
            output,
            excludes,
            compress,
        } => {
            let mut program = Program::new(
                fs,
                stdout_sink(),
                compress.to_gzip_config(),
                SortConfig::default(),
            );
            let patterns = program
                .merge_excludes(&excludes.excludes, excludes.excludes_from.as_deref())
                .await?;
            program.create(&cancel, &root, &output, &patterns).await
        }

        Command::Diff {
            old,
            new,
            output,
            excludes,
            compression,
            sorter,
        } => {
            let gzip_config = GzipConfig {
                compression_level: compression,
                ..GzipConfig::default()
            };
            let mut program =
                Program::new(fs, stdout_sink(), gzip_config, sorter.to_sort_config());
            let patterns = program
                .merge_excludes(&excludes.excludes, excludes.excludes_from.as_deref())
                .await?;
            program
                .diff(&cancel, &old, &new, &output, &patterns)
                .await
                .map(|_| ())
        }

        Command::List { input, sort, sorter } => {
            let mut program = Program::new(
                fs,
                stdout_sink(),
                GzipConfig::default(),
                sorter.to_sort_config(),
            );
            program.list(&cancel, &input, sort).await
        }
    }
}

fn exit_code(result: Result<ops::Result<()>, tokio::task::JoinError>) -> i32 {
    match result {
        Ok(Ok(())) => EXIT_SUCCESS,
        Ok(Err(err)) if err.is_diffs_found() => EXIT_DIFFS_FOUND,
        Ok(Err(err)) => {
            eprintln!("error: {err}");
            EXIT_FAILURE
        }
        Err(_) => {
            eprintln!("error: command task failed");
            EXIT_FAILURE
        }
    }
}

fn stdout_sink() -> Box<dyn std::io::Write + Send + Sync> {
    Box::new(std::io::BufWriter::new(std::io::stdout()))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

// =============================================================================
// Signals
// =============================================================================

/// Resolves when the process receives an interrupt (SIGINT/SIGTERM).
#[cfg(unix)]
async fn interrupt_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn interrupt_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// SIGUSR1 dumps a runtime snapshot to stderr without touching the operation.
#[cfg(unix)]
fn spawn_debug_signal_task() {
    use tokio::signal::unix::{signal, SignalKind};

    if let Ok(mut usr1) = signal(SignalKind::user_defined1()) {
        tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                let metrics = tokio::runtime::Handle::current().metrics();
                eprintln!(
                    "runtime: {} workers, {} alive tasks",
                    metrics.num_workers(),
                    metrics.num_alive_tasks(),
                );
            }
        });
    }
}

#[cfg(not(unix))]
fn spawn_debug_signal_task() {}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_parses_arguments_and_defaults() {
        let cli = Cli::try_parse_from([
            "hollowtar",
            "create",
            "/data",
            "out.tar.gz",
            "--exclude=*.log",
            "--exclude=build/",
        ])
        .unwrap();

        match cli.command {
            Command::Create {
                root,
                output,
                excludes,
                compress,
            } => {
                assert_eq!(root, PathBuf::from("/data"));
                assert_eq!(output, PathBuf::from("out.tar.gz"));
                assert_eq!(excludes.excludes, vec!["*.log", "build/"]);
                assert_eq!(compress.compression, 9);
                assert_eq!(compress.blocksize, 1 << 20);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_create_requires_both_positional_arguments() {
        assert!(Cli::try_parse_from(["hollowtar", "create", "/data"]).is_err());
    }

    #[test]
    fn test_diff_parses_sorter_flags() {
        let cli = Cli::try_parse_from([
            "hollowtar",
            "diff",
            "old.tar.gz",
            "new",
            "diff.tar.gz",
            "--tmpdir=/mnt/big",
            "--workers=2",
            "--chunksize=500",
        ])
        .unwrap();

        match cli.command {
            Command::Diff { sorter, .. } => {
                let config = sorter.to_sort_config();
                assert_eq!(config.tmp_dir, Some(PathBuf::from("/mnt/big")));
                assert_eq!(config.num_workers, 2);
                assert_eq!(config.chunk_size, 500);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_negative_compression_is_parsed_and_rejected_later() {
        // The flag parses; the archive writer rejects it before writing.
        let cli = Cli::try_parse_from([
            "hollowtar",
            "create",
            "/data",
            "out.tar.gz",
            "--compression=-17",
        ])
        .unwrap();

        match cli.command {
            Command::Create { compress, .. } => {
                assert!(compress.to_gzip_config().validate().is_err());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_list_sort_flag_accepts_explicit_false() {
        let cli =
            Cli::try_parse_from(["hollowtar", "list", "in.tar.gz", "--sort=false"]).unwrap();

        match cli.command {
            Command::List { sort, .. } => assert!(!sort),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_list_sort_defaults_to_true() {
        let cli = Cli::try_parse_from(["hollowtar", "list", "in.tar.gz"]).unwrap();

        match cli.command {
            Command::List { sort, .. } => assert!(sort),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["hollowtar", "explode"]).is_err());
    }
}
