use log::{debug, info, warn};

use crate::api::{ApiResponse, ApiResult, TrackerRepository};
use crate::time_entry::{TimeEntry, TodaySummary};

/// タイマーの状態。
#[derive(Clone, Debug, PartialEq)]
pub enum TimerState {
    Idle,
    /// 開始リクエストの応答待ち。
    Starting,
    Running(TimeEntry),
    /// 停止リクエストの応答待ち。停止対象のentryを保持する。
    Stopping(TimeEntry),
}

/// refreshの発行順を表す番号。最後に発行されたものだけが反映される。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshTicket(u64);

/// refreshで並行に取得した3つの結果。それぞれ独立して反映される。
pub struct RefreshSnapshot {
    pub current: ApiResult<TimeEntry>,
    pub summary: ApiResult<TodaySummary>,
    pub entries: ApiResult<Vec<TimeEntry>>,
}

/// タイマー、当日のサマリー、time entry一覧を保持するセッション。
///
/// アプリケーションのトップレベルが所有し、必要な処理に参照で渡す。
/// 状態の変更は全て`&mut self`を経由するため、開始・停止のリクエストは同時に1つまでしか発行されない。
pub struct TimerSession<'a, T: TrackerRepository> {
    api: &'a T,
    state: TimerState,
    summary: Option<TodaySummary>,
    entries: Vec<TimeEntry>,
    error: Option<String>,
    sequence: u64,
}

impl<'a, T: TrackerRepository> TimerSession<'a, T> {
    /// 新しい`TimerSession`を返す。
    ///
    /// # Arguments
    /// * `api` - time tracker APIと通信するためのリポジトリ
    pub fn new(api: &'a T) -> Self {
        Self {
            api,
            state: TimerState::Idle,
            summary: None,
            entries: Vec::new(),
            error: None,
            sequence: 0,
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    /// 計測中のタイマー。停止リクエストの応答待ちの間も返す。
    pub fn current_timer(&self) -> Option<&TimeEntry> {
        match &self.state {
            TimerState::Running(entry) | TimerState::Stopping(entry) => Some(entry),
            TimerState::Idle | TimerState::Starting => None,
        }
    }

    pub fn summary(&self) -> Option<&TodaySummary> {
        self.summary.as_ref()
    }

    pub fn entries(&self) -> &[TimeEntry] {
        &self.entries
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// 開始・停止のリクエストが応答待ちかどうか。
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, TimerState::Starting | TimerState::Stopping(_))
    }

    /// タイマーを開始する。
    ///
    /// 成功した場合は`Running`に遷移してからrefreshを行う。失敗した場合は`Idle`に戻り、エラーを保持する。
    ///
    /// # Arguments
    ///
    /// * `client` - クライアント名
    /// * `project` - プロジェクト名
    /// * `description` - 作業内容。空でもよい。
    pub async fn start(&mut self, client: &str, project: &str, description: &str) -> bool {
        match self.state {
            TimerState::Idle => {}
            TimerState::Running(_) => {
                self.error = Some("A timer is already running".to_string());
                return false;
            }
            TimerState::Starting | TimerState::Stopping(_) => {
                self.error = Some("Another timer request is in progress".to_string());
                return false;
            }
        }

        self.error = None;
        self.state = TimerState::Starting;
        self.sequence += 1;

        match self.api.start_timer(client, project, description).await {
            Ok(ApiResponse {
                success: true,
                data: Some(entry),
                ..
            }) => {
                info!("Timer started: {}", entry.id);
                self.state = TimerState::Running(entry);
                self.refresh().await;
                true
            }
            Ok(response) => {
                self.state = TimerState::Idle;
                self.error = Some(
                    response
                        .error
                        .unwrap_or_else(|| "Failed to start timer".to_string()),
                );
                false
            }
            Err(err) => {
                self.state = TimerState::Idle;
                self.error = Some(err.to_string());
                false
            }
        }
    }

    /// 計測中のタイマーを停止する。
    ///
    /// 停止の応答を受け取ってからrefreshを行う。失敗した場合は`Running`のまま、エラーを保持する。
    pub async fn stop(&mut self) -> bool {
        let entry = match &self.state {
            TimerState::Running(entry) => entry.clone(),
            TimerState::Idle => {
                self.error = Some("No timer is running".to_string());
                return false;
            }
            TimerState::Starting | TimerState::Stopping(_) => {
                self.error = Some("Another timer request is in progress".to_string());
                return false;
            }
        };

        self.error = None;
        self.state = TimerState::Stopping(entry.clone());
        self.sequence += 1;

        match self.api.stop_timer().await {
            Ok(response) if response.success => {
                info!("Timer stopped: {}", entry.id);
                self.state = TimerState::Idle;
                self.refresh().await;
                true
            }
            Ok(response) => {
                self.state = TimerState::Running(entry);
                self.error = Some(
                    response
                        .error
                        .unwrap_or_else(|| "Failed to stop timer".to_string()),
                );
                false
            }
            Err(err) => {
                self.state = TimerState::Running(entry);
                self.error = Some(err.to_string());
                false
            }
        }
    }

    /// 現在のタイマー、当日のサマリー、time entry一覧を取得し直す。
    ///
    /// より新しいrefreshや開始・停止が発行されていた場合、結果は破棄され`false`を返す。
    pub async fn refresh(&mut self) -> bool {
        let ticket = self.begin_refresh();
        let snapshot = self.fetch_snapshot().await;
        self.apply_refresh(ticket, snapshot)
    }

    /// 新しいrefreshの番号を発行する。以前に発行された番号は無効になる。
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.sequence += 1;
        self.error = None;
        RefreshTicket(self.sequence)
    }

    /// 3つの読み取りを並行に発行し、全ての完了を待つ。
    ///
    /// 1つが失敗しても他の結果はそのまま返す。
    pub async fn fetch_snapshot(&self) -> RefreshSnapshot {
        let (current, summary, entries) = tokio::join!(
            self.api.current_timer(),
            self.api.today_summary(),
            self.api.time_entries()
        );

        RefreshSnapshot {
            current,
            summary,
            entries,
        }
    }

    /// refreshの結果を反映する。
    ///
    /// `ticket`が最新でなければ何もせずに`false`を返す。
    /// 3つの結果はそれぞれ独立に反映し、失敗した結果に対応する状態は変更しない。
    pub fn apply_refresh(&mut self, ticket: RefreshTicket, snapshot: RefreshSnapshot) -> bool {
        if ticket.0 != self.sequence {
            debug!(
                "Discarding stale refresh {} (latest {})",
                ticket.0, self.sequence
            );
            return false;
        }

        match snapshot.current {
            Ok(response) => match response.data {
                Some(entry) if response.success && entry.is_running => {
                    debug!("Current timer: {}", entry.id);
                    warn_invalid(&entry);
                    self.state = TimerState::Running(entry);
                }
                _ => {
                    debug!("No current timer found or timer not running");
                    self.state = TimerState::Idle;
                }
            },
            Err(err) => self.error = Some(err.to_string()),
        }

        match snapshot.summary {
            Ok(ApiResponse {
                success: true,
                data: Some(summary),
                ..
            }) => self.summary = Some(summary),
            Ok(_) => {}
            Err(err) => self.error = Some(err.to_string()),
        }

        match snapshot.entries {
            Ok(ApiResponse {
                success: true,
                data: Some(entries),
                ..
            }) => {
                entries.iter().for_each(warn_invalid);
                self.entries = entries;
            }
            Ok(_) => {}
            Err(err) => self.error = Some(err.to_string()),
        }

        true
    }
}

/// 状態が不整合なentryを警告する。サーバーの値は正としてそのまま使う。
fn warn_invalid(entry: &TimeEntry) {
    if let Err(err) = entry.validate() {
        warn!("{}", err);
    }
}
