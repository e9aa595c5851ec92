use anyhow::{bail, Result};
use log::{debug, info, warn};

use crate::api::{ApiResponse, TrackerRepository};
use crate::console::ConsolePresenter;
use crate::invoice::Selection;
use crate::timer_session::TimerSession;

/// `start`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct StartArgs {
    #[clap(short = 'c', long = "client", help = "Client name")]
    client: String,

    #[clap(short = 'p', long = "project", help = "Project name")]
    project: String,

    #[clap(
        short = 'd',
        long = "description",
        default_value = "",
        help = "What you are working on"
    )]
    description: String,
}

/// タイマーの操作と状態の表示を行うサブコマンド群。
pub struct TrackerCommand<'a, T: TrackerRepository> {
    api: &'a T,
}

impl<'a, T: TrackerRepository> TrackerCommand<'a, T> {
    /// 新しい`TrackerCommand`を返す。
    ///
    /// # Arguments
    /// * `api` - time tracker APIと通信するためのリポジトリ
    pub fn new(api: &'a T) -> Self {
        Self { api }
    }

    /// `start`サブコマンドの処理を行う。
    ///
    /// 開始後のrefreshに失敗しても、開始自体が成功していればエラーにはしない。
    pub async fn start<P: ConsolePresenter>(&self, args: StartArgs, presenter: &mut P) -> Result<()> {
        let mut session = TimerSession::new(self.api);
        if !session
            .start(&args.client, &args.project, &args.description)
            .await
        {
            bail!("{}", error_message(session.error()));
        }
        if let Some(err) = session.error() {
            warn!("Failed to refresh after start: {}", err);
            session.clear_error();
        }

        presenter.show_timer(session.current_timer())
    }

    /// `stop`サブコマンドの処理を行う。
    ///
    /// 現在のタイマーを取得してから停止する。
    pub async fn stop<P: ConsolePresenter>(&self, presenter: &mut P) -> Result<()> {
        let mut session = TimerSession::new(self.api);
        session.refresh().await;
        if session.current_timer().is_none() {
            if let Some(err) = session.error() {
                bail!("{}", err);
            }
        }
        if !session.stop().await {
            bail!("{}", error_message(session.error()));
        }
        info!("Timer stopped successfully.");

        presenter.show_timer(session.current_timer())?;
        if let Some(summary) = session.summary() {
            presenter.show_summary(summary)?;
        }

        Ok(())
    }

    /// `status`サブコマンドの処理を行う。
    ///
    /// 取得できた情報は表示し、いずれかの取得に失敗していれば最後にエラーを返す。
    pub async fn status<P: ConsolePresenter>(&self, presenter: &mut P) -> Result<()> {
        let mut session = TimerSession::new(self.api);
        session.refresh().await;
        debug!("Timer state: {:?}", session.state());

        presenter.show_timer(session.current_timer())?;
        if let Some(summary) = session.summary() {
            presenter.show_summary(summary)?;
        }

        match session.error() {
            Some(err) => bail!("{}", err),
            None => Ok(()),
        }
    }

    /// `entries`サブコマンドの処理を行う。
    ///
    /// 表示する位置は`invoice --entry`で指定する位置と同じ。
    pub async fn entries<P: ConsolePresenter>(&self, presenter: &mut P) -> Result<()> {
        let mut session = TimerSession::new(self.api);
        session.refresh().await;
        info!("Time entries retrieved: {}", session.entries().len());

        presenter.show_time_entries(session.entries(), &Selection::new())?;

        match session.error() {
            Some(err) => bail!("{}", err),
            None => Ok(()),
        }
    }

    /// `health`サブコマンドの処理を行う。
    pub async fn health<P: ConsolePresenter>(&self, presenter: &mut P) -> Result<()> {
        match self.api.health_check().await {
            Ok(ApiResponse {
                success: true,
                data: Some(health),
                ..
            }) => presenter.show_health(&health),
            Ok(response) => bail!(
                "{}",
                response
                    .error
                    .unwrap_or_else(|| "Health check failed".to_string())
            ),
            Err(err) => {
                debug!("Health check failed with status {}", err.status());
                bail!("{}", err)
            }
        }
    }
}

fn error_message(error: Option<&str>) -> &str {
    error.unwrap_or("An unexpected error occurred")
}
