use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time_entry::TimeEntry;

/// 請求書の1行。プロジェクトごとに集計される。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub description: String,
    pub hours: f64,
    pub rate: f64,
    pub amount: f64,
}

/// 請求書生成APIへのリクエスト。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub client_name: String,
    pub client_email: String,
    pub line_items: Vec<InvoiceLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// 請求書生成APIのレスポンス。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub invoice_path: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 小数点以下2桁に丸める。
///
/// 入力は非負を前提とする。
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 請求対象として選択されたtime entryの位置の集合。
///
/// 順序は意味を持たない。範囲外の位置は単に一致しないだけで、エラーにはならない。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection(BTreeSet<usize>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 指定位置の選択状態を反転する。
    pub fn toggle(&mut self, index: usize) {
        if !self.0.remove(&index) {
            self.0.insert(index);
        }
    }

    /// 全件が選択済みなら選択を解除し、そうでなければ`0..len`を全て選択する。
    pub fn toggle_all(&mut self, len: usize) {
        if self.0.len() == len {
            self.0.clear();
        } else {
            self.0 = (0..len).collect();
        }
    }

    #[cfg(test)]
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<usize> for Selection {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 選択されたtime entryから請求書の行を作る。
///
/// 選択されたentryを元の並び順のままプロジェクトごとにまとめ、最初に現れた順に行を返す。
/// 金額は丸める前の合計時間に単価を掛けてから丸めるため、`round2(hours * rate)`と一致しない場合がある。
///
/// # Arguments
///
/// * `entries` - 取得済みのtime entry
/// * `selected` - 請求対象の位置
/// * `rate` - 時間単価
pub fn derive_line_items(
    entries: &[TimeEntry],
    selected: &Selection,
    rate: f64,
) -> Vec<InvoiceLineItem> {
    let mut order: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&TimeEntry>)> = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        if !selected.contains(index) {
            continue;
        }
        let position = *order.entry(entry.project.as_str()).or_insert_with(|| {
            groups.push((entry.project.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(entry);
    }

    groups
        .into_iter()
        .map(|(project, group)| {
            let total_hours = group.iter().fold(0.0, |sum, entry| {
                sum + entry.billable_minutes() as f64 / 60.0
            });
            let descriptions = group
                .iter()
                .map(|entry| entry.description.as_str())
                .filter(|description| !description.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            let description = if descriptions.is_empty() {
                project.to_string()
            } else {
                format!("{} - {}", project, descriptions)
            };

            InvoiceLineItem {
                description,
                hours: round2(total_hours),
                rate,
                amount: round2(total_hours * rate),
            }
        })
        .collect()
}

/// 請求書の合計金額。各行の`amount`を合計するだけで、再計算はしない。
pub fn invoice_total(line_items: &[InvoiceLineItem]) -> f64 {
    line_items.iter().map(|item| item.amount).sum()
}

/// 請求書の入力内容が不正であることを表すエラー。
#[derive(Debug, Error, PartialEq)]
pub enum InvoiceError {
    #[error("Client name is required")]
    MissingClientName,
    #[error("Client email is required")]
    MissingClientEmail,
    #[error("Select at least one time entry")]
    NoEntriesSelected,
    #[error("Selected entries produced no line items")]
    NoLineItems,
    #[error("Hourly rate must be a non-negative number: {0}")]
    InvalidRate(f64),
}

/// 請求書フォームの入力内容。
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceDraft {
    pub client_name: String,
    pub client_email: String,
    pub notes: String,
    pub rate: f64,
    pub date: Option<NaiveDate>,
    pub selection: Selection,
}

impl InvoiceDraft {
    /// 新しい`InvoiceDraft`を返す。
    pub fn new(rate: f64) -> Self {
        Self {
            client_name: String::new(),
            client_email: String::new(),
            notes: String::new(),
            rate,
            date: None,
            selection: Selection::new(),
        }
    }

    /// クライアント名が未入力の場合、先頭のentryのクライアント名で埋める。
    pub fn populate_client_name(&mut self, entries: &[TimeEntry]) {
        if !self.client_name.is_empty() {
            return;
        }
        if let Some(entry) = entries.first() {
            self.client_name = entry.client.clone();
        }
    }

    /// 現在の入力内容から請求書の行を作る。
    pub fn line_items(&self, entries: &[TimeEntry]) -> Vec<InvoiceLineItem> {
        derive_line_items(entries, &self.selection, self.rate)
    }

    /// 入力内容を検証し、APIに送るリクエストを作る。
    ///
    /// # Arguments
    ///
    /// * `entries` - 選択の対象となるtime entry
    /// * `today` - 日付が未指定の場合に利用する生成日
    pub fn build_request(
        &self,
        entries: &[TimeEntry],
        today: NaiveDate,
    ) -> Result<InvoiceRequest, InvoiceError> {
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(InvoiceError::InvalidRate(self.rate));
        }
        let client_name = self.client_name.trim();
        if client_name.is_empty() {
            return Err(InvoiceError::MissingClientName);
        }
        let client_email = self.client_email.trim();
        if client_email.is_empty() {
            return Err(InvoiceError::MissingClientEmail);
        }
        if self.selection.is_empty() {
            return Err(InvoiceError::NoEntriesSelected);
        }
        let line_items = self.line_items(entries);
        if line_items.is_empty() {
            return Err(InvoiceError::NoLineItems);
        }
        let notes = Some(self.notes.trim())
            .filter(|notes| !notes.is_empty())
            .map(str::to_string);
        let date = self.date.unwrap_or(today);

        Ok(InvoiceRequest {
            client_name: client_name.to_string(),
            client_email: client_email.to_string(),
            line_items,
            notes,
            date: Some(date.format("%Y-%m-%d").to_string()),
        })
    }
}
