use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// リモートサービスが返す1件のtime entry。
///
/// 計測中のentryは`end_time`と`duration_minutes`を持たない。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: String,
    pub client: String,
    pub project: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub is_running: bool,
}

/// `TimeEntry`の状態が不整合であることを表すエラー。
#[derive(Debug, Error, PartialEq)]
pub enum EntryContractError {
    #[error("entry {id} is running but has an end time or duration")]
    RunningWithEnd { id: String },
    #[error("entry {id} is stopped but is missing its end time or duration")]
    StoppedWithoutEnd { id: String },
}

impl TimeEntry {
    /// 請求に利用する分数を返す。
    ///
    /// 計測中のentryは0分として扱う。`end_time - start_time`ではなくリモートの`duration_minutes`を正とする。
    pub fn billable_minutes(&self) -> u32 {
        self.duration_minutes.unwrap_or(0)
    }

    /// `is_running`と`end_time`/`duration_minutes`の有無が一致しているかを検証する。
    pub fn validate(&self) -> Result<(), EntryContractError> {
        let has_end = self.end_time.is_some() || self.duration_minutes.is_some();
        let is_complete = self.end_time.is_some() && self.duration_minutes.is_some();
        match (self.is_running, has_end, is_complete) {
            (true, true, _) => Err(EntryContractError::RunningWithEnd {
                id: self.id.clone(),
            }),
            (false, _, false) => Err(EntryContractError::StoppedWithoutEnd {
                id: self.id.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// クライアント・プロジェクトごとの当日の集計。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub client_project: String,
    pub hours: f64,
    pub minutes: u32,
}

/// 当日のサマリー。サーバー側で集計される。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodaySummary {
    pub total_hours: f64,
    pub total_minutes: u32,
    pub entry_count: u32,
    #[serde(default)]
    pub breakdown: Option<Vec<BreakdownEntry>>,
}

impl TodaySummary {
    /// 1 entryあたりの平均分数を返す。entryが無い場合は`None`。
    pub fn average_minutes(&self) -> Option<u32> {
        if self.entry_count == 0 {
            return None;
        }
        Some((self.total_minutes as f64 / self.entry_count as f64).round() as u32)
    }
}
