//! crxkit - browser extension container toolkit
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Resolves extension ids from store URLs, fetches containers from the
//! update service with mirror fallback, packs and signs unpacked sources,
//! and inspects existing containers.

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Directory downloads land in when `--output` is not given.
pub const DEFAULT_OUTPUT_DIR: &str = "extension_files";

#[derive(Debug, Parser)]
#[command(name = "crxkit")]
#[command(author, version, about = "crxkit - fetch, pack and inspect browser extension containers")]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the extension id found in each reference
    Resolve {
        /// Store URL, download URL, file name or bare id
        #[arg(required = true)]
        references: Vec<String>,
    },
    /// Download an extension container
    Download {
        /// Store URL, download URL, file name or bare id
        reference: String,
        /// Output directory
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output: PathBuf,
        /// Overwrite an existing file instead of adding a numeric suffix
        #[arg(short, long)]
        force: bool,
        /// Also unpack the archive next to the container
        #[arg(short = 'x', long)]
        extract: bool,
        #[command(flatten)]
        net: NetArgs,
    },
    /// Pack and sign an unpacked extension
    Pack {
        /// Extension source directory (must contain manifest.json)
        source: PathBuf,
        /// PEM private key (PKCS#8 or PKCS#1)
        #[arg(short, long)]
        key: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Output file stem (defaults to the source directory name)
        #[arg(short, long)]
        name: Option<String>,
        /// Create the key first if it does not exist
        #[arg(long)]
        generate_key: bool,
        /// Minify .js files with terser when available
        #[arg(long)]
        minify: bool,
        /// Sign with SHA-1 and embed a PKCS#1 public key
        #[arg(long)]
        legacy: bool,
    },
    /// Show header, manifest and contents of a container
    Parse {
        /// Container file (.crx or .zip)
        file: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
        /// Unpack the archive into this directory
        #[arg(long)]
        extract: Option<PathBuf>,
        /// Preferred UI locale for a localized name [env: CRXKIT_LOCALE, default: zh_CN]
        #[arg(long)]
        locale: Option<String>,
    },
    /// Generate an RSA signing key
    Keygen {
        /// Where to write the PEM file
        path: PathBuf,
        /// Modulus size in bits
        #[arg(long, default_value_t = crxkit_core::io::keys::DEFAULT_KEY_BITS)]
        bits: usize,
    },
    /// List permissions and chrome.* API usage of an unpacked extension
    Apis {
        /// Extension directory
        #[arg(default_value = DEFAULT_OUTPUT_DIR)]
        dir: PathBuf,
    },
}

/// Network settings shared by commands that talk to endpoints.
///
/// Each flag overrides the matching `CRXKIT_*` environment variable.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct NetArgs {
    /// Proxy URL for all requests [env: CRXKIT_PROXY]
    #[arg(long)]
    pub proxy: Option<String>,
    /// Per-request timeout in seconds [env: CRXKIT_TIMEOUT, default: 30]
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Skip TLS certificate verification [env: CRXKIT_INSECURE]
    #[arg(long)]
    pub insecure: bool,
    /// Preferred UI locale for localized names [env: CRXKIT_LOCALE, default: zh_CN]
    #[arg(long)]
    pub locale: Option<String>,
    /// Extra endpoint template with an {id} slot, tried after the built-in
    /// ones and any from CRXKIT_MIRRORS
    #[arg(long = "mirror", value_delimiter = ',')]
    pub mirrors: Vec<String>,
}
