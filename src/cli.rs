//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use docfetch_core::FormatSignature;
use url::Url;

/// Save a remote document as a local file.
///
/// Docfetch asks for a native save of the source first and, if that is not
/// possible, fetches the document, checks that it really is the expected
/// file format, and saves it.
#[derive(Parser, Debug)]
#[command(name = "docfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Document location: an http(s) or file URL, or a path relative to --origin
    pub source: String,

    /// File name to save as (defaults to the last segment of the source)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Directory to save into (defaults to the current directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Base URL that relative sources are resolved against
    #[arg(long)]
    pub origin: Option<Url>,

    /// Expected file format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Pdf)]
    pub format: FormatArg,

    /// Custom leading-bytes signature in hex (e.g. 25504446), overrides --format
    #[arg(long, requires = "content_type")]
    pub magic: Option<String>,

    /// Declared content type for a custom --magic signature
    #[arg(long, requires = "magic")]
    pub content_type: Option<String>,

    /// Give up on a fetch after this many seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout_secs: Option<u64>,

    /// Maximum retry attempts for transient fetch failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Stream remote sources straight to disk instead of fetching and verifying them
    #[arg(long)]
    pub direct_remote: bool,

    /// Maximum number of simultaneously held local handles (1-1024)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=1024))]
    pub max_handles: Option<u16>,

    /// Print the outcome as a JSON object
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Built-in expected formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Pdf,
    Png,
    Zip,
}

impl Args {
    /// Expected format from `--magic`/`--content-type`, or `--format`.
    pub fn signature(&self) -> Result<FormatSignature> {
        if let (Some(magic), Some(content_type)) = (&self.magic, &self.content_type) {
            return Ok(FormatSignature::new(
                "custom",
                parse_hex_bytes(magic)?,
                content_type.as_str(),
            ));
        }
        Ok(match self.format {
            FormatArg::Pdf => FormatSignature::pdf(),
            FormatArg::Png => FormatSignature::png(),
            FormatArg::Zip => FormatSignature::zip(),
        })
    }
}

/// Parses hex such as `25504446`, `0x25504446` or `25 50 44 46`.
fn parse_hex_bytes(raw: &str) -> Result<Vec<u8>> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);

    if digits.is_empty() || digits.len() % 2 != 0 {
        bail!("Invalid --magic value '{raw}': expected an even number of hex digits");
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| anyhow::anyhow!("Invalid --magic value '{raw}': not hex"))
        })
        .collect()
}
