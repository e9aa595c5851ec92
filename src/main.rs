use std::io;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, LevelFilter};

mod api;
mod config;
mod console;
mod datetime;
mod invoice;
mod invoice_command;
mod invoice_session;
mod time_entry;
mod timer_session;
mod tracker_command;

use api::ApiClient;
use config::Config;
use console::ConsoleMarkdownList;
use invoice_command::{InvoiceArgs, InvoiceCommand};
use tracker_command::{StartArgs, TrackerCommand};

/// time trackerと請求書生成APIを操作するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- start --client Acme --project Site
/// $ cargo run -- status
/// $ cargo run -- invoice --client-email billing@acme.test --all
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        long = "api-url",
        global = true,
        help = "Base URL of the API (overrides TIMEBILL_API_BASE_URL)"
    )]
    api_url: Option<String>,

    #[clap(
        short = 'v',
        long = "verbose",
        global = true,
        parse(from_occurrences),
        help = "Increase log verbosity"
    )]
    verbose: u8,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Start a timer
    Start(StartArgs),
    /// Stop the running timer
    Stop,
    /// Show the running timer and today's summary
    Status,
    /// List time entries with the positions used by `invoice --entry`
    Entries,
    /// Generate an invoice from time entries
    Invoice(InvoiceArgs),
    /// Check that the API is reachable
    Health,
}

/// ログの出力を設定する。ログは標準エラー出力に出す。
fn setup_logger(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .debug(Color::Blue);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .context("Failed to set up logger")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logger(args.verbose)?;

    let config = Config::load()
        .context("Failed to load config")?
        .with_api_url(args.api_url);
    debug!("Using API at {}", config.api_base_url);

    let client = ApiClient::new(&config.api_base_url);
    let mut stdout = io::stdout();
    let mut presenter = ConsoleMarkdownList::new(&mut stdout, client.base_url());
    let tracker = TrackerCommand::new(&client);

    match args.subcommand {
        SubCommands::Start(start) => tracker.start(start, &mut presenter).await?,
        SubCommands::Stop => tracker.stop(&mut presenter).await?,
        SubCommands::Status => tracker.status(&mut presenter).await?,
        SubCommands::Entries => tracker.entries(&mut presenter).await?,
        SubCommands::Invoice(invoice) => {
            InvoiceCommand::new(&client, config.default_rate)
                .run(invoice, &mut presenter)
                .await?
        }
        SubCommands::Health => tracker.health(&mut presenter).await?,
    }

    Ok(())
}
