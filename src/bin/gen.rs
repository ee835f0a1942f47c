//! blockidx-gen: CLI tool for producing wire-format update batches from
//! text blocklists.
//!
//! Text format, one directive per line (`#` starts a comment):
//!
//! ```text
//! add ads.example.com
//! add tracker.example.com deceive
//! add login.example.com redirect 192.0.2.10
//! del stale.example.com
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use blockidx::wire::encode_record;
use blockidx::{ControlAction, Error, Opcode, Result};

#[derive(Parser)]
#[command(name = "blockidx-gen")]
#[command(version = "0.1.0")]
#[command(about = "Generate wire-format update batches from text blocklists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a text blocklist to a binary batch file
    Convert {
        /// Input text file
        #[arg(short, long)]
        input: PathBuf,

        /// Output batch file
        #[arg(short, long)]
        output: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Append a text blocklist to a journal file
    Seed {
        /// Input text file
        #[arg(short, long)]
        input: PathBuf,

        /// Journal file to append to (created if absent)
        #[arg(short, long)]
        journal: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            input,
            output,
            verbose,
        } => convert_file(&input, &output, verbose),
        Commands::Seed {
            input,
            journal,
            verbose,
        } => seed_journal(&input, &journal, verbose),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn convert_file(input: &Path, output: &Path, verbose: bool) -> Result<()> {
    let text = fs::read_to_string(input)?;
    let (batch, count) = parse_directives(&text)?;
    fs::write(output, &batch)?;
    if verbose {
        println!(
            "{}: {} records, {} bytes -> {}",
            input.display(),
            count,
            batch.len(),
            output.display()
        );
    }
    Ok(())
}

fn seed_journal(input: &Path, journal_path: &Path, verbose: bool) -> Result<()> {
    let text = fs::read_to_string(input)?;
    let (batch, count) = parse_directives(&text)?;
    let mut journal = blockidx::journal::Journal::open(journal_path)?;
    journal.append(&batch)?;
    if verbose {
        println!(
            "{}: appended {} records to {}",
            input.display(),
            count,
            journal_path.display()
        );
    }
    Ok(())
}

/// Parse directive lines into one wire batch. Returns the batch bytes and
/// the record count.
fn parse_directives(text: &str) -> Result<(Vec<u8>, usize)> {
    let mut batch = Vec::new();
    let mut count = 0usize;

    for (lineno, raw) in text.lines().enumerate() {
        let line = match raw.find('#') {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        let mut parts = line.split_whitespace();
        let verb = match parts.next() {
            Some(v) => v,
            None => continue,
        };
        let domain = parts
            .next()
            .ok_or_else(|| Error::Config(format!("line {}: missing domain", lineno + 1)))?;

        match verb.to_ascii_lowercase().as_str() {
            "add" => {
                let action = match parts.next() {
                    Some(word) => ControlAction::from_str(word).map_err(|_| {
                        Error::Config(format!("line {}: unknown action '{}'", lineno + 1, word))
                    })?,
                    None => ControlAction::Drop,
                };
                let redirect = parts.next();
                encode_record(&mut batch, Opcode::Add, action, domain, redirect)?;
            }
            "del" | "delete" => {
                encode_record(&mut batch, Opcode::Delete, ControlAction::Drop, domain, None)?;
            }
            other => {
                return Err(Error::Config(format!(
                    "line {}: unknown directive '{}'",
                    lineno + 1,
                    other
                )));
            }
        }
        count += 1;
    }

    Ok((batch, count))
}
