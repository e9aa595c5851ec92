use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::{info, warn};

use crate::api::TrackerRepository;
use crate::console::ConsolePresenter;
use crate::datetime;
use crate::invoice::{InvoiceDraft, Selection};
use crate::invoice_session::InvoiceSession;
use crate::timer_session::TimerSession;

/// `invoice`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct InvoiceArgs {
    #[clap(
        long = "client-name",
        help = "Client name; defaults to the client of the first time entry"
    )]
    client_name: Option<String>,

    #[clap(long = "client-email", help = "Client email")]
    client_email: Option<String>,

    #[clap(short = 'r', long = "rate", help = "Hourly rate")]
    rate: Option<f64>,

    #[clap(short = 'n', long = "notes", help = "Notes printed on the invoice")]
    notes: Option<String>,

    #[clap(
        long = "date",
        help = "Sets a custom invoice date in the format YYYY-MM-DD",
        parse(try_from_str = parse_date),
    )]
    date: Option<NaiveDate>,

    #[clap(
        short = 'e',
        long = "entry",
        help = "Position of a time entry to bill, as shown by `entries`"
    )]
    entries: Vec<usize>,

    #[clap(short = 'a', long = "all", help = "Bill every time entry")]
    all: bool,

    #[clap(
        short = 'x',
        long = "exclude",
        help = "Position of a time entry to leave out, combined with --all"
    )]
    exclude: Vec<usize>,

    #[clap(long = "dry-run", help = "Show the line items without generating the invoice")]
    dry_run: bool,
}

/// 請求書を作成するサブコマンド。
pub struct InvoiceCommand<'a, T: TrackerRepository> {
    api: &'a T,
    default_rate: f64,
}

impl<'a, T: TrackerRepository> InvoiceCommand<'a, T> {
    /// 新しい`InvoiceCommand`を返す。
    ///
    /// # Arguments
    /// * `api` - time tracker APIと通信するためのリポジトリ
    /// * `default_rate` - `--rate`が指定されなかった場合の時間単価
    pub fn new(api: &'a T, default_rate: f64) -> Self {
        Self { api, default_rate }
    }

    /// `invoice`サブコマンドの処理を行う。
    ///
    /// time entryを取得し、選択されたentryから請求書の行を表示する。
    /// `--dry-run`でなければ請求書の生成をリクエストし、その結果を表示する。
    pub async fn run<P: ConsolePresenter>(&self, args: InvoiceArgs, presenter: &mut P) -> Result<()> {
        let mut timer = TimerSession::new(self.api);
        timer.refresh().await;
        if let Some(err) = timer.error() {
            if timer.entries().is_empty() {
                bail!("{}", err);
            }
            warn!("Partial refresh failure: {}", err);
            timer.clear_error();
        }
        let entries = timer.entries();
        info!("Time entries retrieved: {}", entries.len());

        if let Some(index) = args
            .entries
            .iter()
            .chain(&args.exclude)
            .find(|index| **index >= entries.len())
        {
            bail!(
                "Time entry {} does not exist ({} entries available)",
                index,
                entries.len()
            );
        }
        let mut selection = args.entries.iter().copied().collect::<Selection>();
        if args.all && selection.len() != entries.len() {
            selection.toggle_all(entries.len());
        }
        for index in args.exclude {
            if selection.contains(index) {
                selection.toggle(index);
            }
        }
        info!("Selected {} of {} entries", selection.len(), entries.len());

        let mut draft = InvoiceDraft::new(args.rate.unwrap_or(self.default_rate));
        draft.client_name = args.client_name.unwrap_or_default();
        draft.populate_client_name(entries);
        draft.client_email = args.client_email.unwrap_or_default();
        draft.notes = args.notes.unwrap_or_default();
        draft.date = args.date;
        draft.selection = selection;

        presenter.show_time_entries(entries, &draft.selection)?;
        presenter.show_line_items(&draft.line_items(entries))?;
        if args.dry_run {
            return Ok(());
        }

        let request = draft
            .build_request(entries, datetime::today())
            .context("Invalid invoice")?;

        let mut session = InvoiceSession::new(self.api);
        session.generate(&request).await;
        match session.last_invoice() {
            Some(invoice) => presenter.show_invoice(invoice),
            None => bail!(
                "{}",
                session.error().unwrap_or("Failed to generate invoice")
            ),
        }
    }
}

/// 日付をパースする。
fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Failed to parse date: {}", s))
}
