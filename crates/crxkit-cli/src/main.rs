//! crxkit - browser extension container toolkit

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crxkit_cli::cmd;
use crxkit_cli::cmd::pack::PackFlags;
use crxkit_cli::ui::Progress;
use crxkit_cli::{Cli, Commands};
use crxkit_core::DownloadOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --verbose only changes the fallback level.
    let fallback = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ui = Progress::select(cli.quiet);

    match cli.command {
        Commands::Resolve { references } => cmd::resolve::resolve_all(&references),
        Commands::Download {
            reference,
            output,
            force,
            extract,
            net,
        } => {
            let options = DownloadOptions { force, extract };
            cmd::download::download(&reference, &output, options, &net, ui).await
        }
        Commands::Pack {
            source,
            key,
            output,
            name,
            generate_key,
            minify,
            legacy,
        } => {
            let flags = PackFlags {
                generate_key,
                minify,
                legacy,
            };
            cmd::pack::pack(&source, &key, &output, name.as_deref(), flags, &ui)
        }
        Commands::Parse {
            file,
            json,
            extract,
            locale,
        } => cmd::parse::parse(&file, json, extract.as_deref(), locale.as_deref()),
        Commands::Keygen { path, bits } => cmd::keygen::keygen(&path, bits),
        Commands::Apis { dir } => cmd::apis::apis(&dir),
    }
}
