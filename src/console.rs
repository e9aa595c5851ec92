use std::io::Write;

use anyhow::{Context, Result};

use crate::api::HealthStatus;
use crate::datetime::{format_clock, format_duration};
use crate::invoice::{invoice_total, InvoiceLineItem, InvoiceResponse, Selection};
use crate::time_entry::{TimeEntry, TodaySummary};

/// Consoleにダッシュボードの情報を表示するためのtrait。
pub trait ConsolePresenter {
    /// 現在のタイマーを表示する。
    fn show_timer(&mut self, timer: Option<&TimeEntry>) -> Result<()>;

    /// 当日のサマリーを表示する。
    fn show_summary(&mut self, summary: &TodaySummary) -> Result<()>;

    /// タイムエントリーを位置と選択状態付きで表示する。
    ///
    /// # Arguments
    ///
    /// * `time_entries` - 表示するタイムエントリー
    /// * `selection` - 請求対象として選択されている位置
    fn show_time_entries(&mut self, time_entries: &[TimeEntry], selection: &Selection)
        -> Result<()>;

    /// 請求書の行と合計金額を表示する。
    fn show_line_items(&mut self, line_items: &[InvoiceLineItem]) -> Result<()>;

    /// 生成された請求書を表示する。
    fn show_invoice(&mut self, invoice: &InvoiceResponse) -> Result<()>;

    /// ヘルスチェックの結果を表示する。
    fn show_health(&mut self, health: &HealthStatus) -> Result<()>;
}

/// Markdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
    base_url: String,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    ///
    /// # Arguments
    ///
    /// * `writer` - 出力先
    /// * `base_url` - 請求書のダウンロードURLを組み立てるためのAPIのベースURL
    pub fn new(writer: &'a mut W, base_url: &str) -> Self {
        Self {
            writer,
            base_url: base_url.to_string(),
        }
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_timer(&mut self, timer: Option<&TimeEntry>) -> Result<()> {
        let written = match timer {
            Some(entry) => {
                let description = if entry.description.is_empty() {
                    String::new()
                } else {
                    format!(": {}", entry.description)
                };
                writeln!(
                    self.writer,
                    "- Running: {} - {}{} (since {})",
                    entry.client,
                    entry.project,
                    description,
                    format_clock(&entry.start_time)
                )
            }
            None => writeln!(self.writer, "- No timer running"),
        };
        written.context("Failed to write timer")
    }

    fn show_summary(&mut self, summary: &TodaySummary) -> Result<()> {
        writeln!(self.writer, "## Today").context("Failed to write summary")?;
        writeln!(
            self.writer,
            "- Total: {} ({:.2}h)",
            format_duration(summary.total_minutes),
            summary.total_hours
        )
        .context("Failed to write summary")?;
        writeln!(self.writer, "- Entries: {}", summary.entry_count)
            .context("Failed to write summary")?;
        if let Some(average) = summary.average_minutes() {
            writeln!(self.writer, "- Average: {}", format_duration(average))
                .context("Failed to write summary")?;
        }

        for entry in summary.breakdown.iter().flatten() {
            writeln!(
                self.writer,
                "  - {}: {} ({:.2}h)",
                entry.client_project,
                format_duration(entry.minutes),
                entry.hours
            )
            .with_context(|| format!("Failed to write breakdown: {:?}", entry))?;
        }

        Ok(())
    }

    // time entryを元の並び順のまま表示する。位置は請求対象の選択に利用する。
    fn show_time_entries(
        &mut self,
        time_entries: &[TimeEntry],
        selection: &Selection,
    ) -> Result<()> {
        for (index, entry) in time_entries.iter().enumerate() {
            let mark = if selection.contains(index) { "x" } else { " " };
            let end_str = entry
                .end_time
                .as_ref()
                .map(format_clock)
                .unwrap_or_else(|| "now".to_string());
            let duration_str = entry
                .duration_minutes
                .map(format_duration)
                .unwrap_or_else(|| "running".to_string());
            writeln!(
                self.writer,
                "- [{}] {}: {} - {} ({} ~ {}, {})",
                mark,
                index,
                entry.client,
                entry.project,
                format_clock(&entry.start_time),
                end_str,
                duration_str
            )
            .with_context(|| format!("Failed to write time entry: {:?}", entry))?;
            if !entry.description.is_empty() {
                writeln!(self.writer, "  - {}", entry.description)
                    .with_context(|| format!("Failed to write time entry: {:?}", entry))?;
            }
        }

        Ok(())
    }

    fn show_line_items(&mut self, line_items: &[InvoiceLineItem]) -> Result<()> {
        for item in line_items {
            writeln!(
                self.writer,
                "- {}: {:.2}h x {:.2} = {:.2}",
                item.description, item.hours, item.rate, item.amount
            )
            .with_context(|| format!("Failed to write line item: {:?}", item))?;
        }
        writeln!(self.writer, "Total: {:.2}", invoice_total(line_items))
            .context("Failed to write invoice total")?;

        Ok(())
    }

    fn show_invoice(&mut self, invoice: &InvoiceResponse) -> Result<()> {
        writeln!(self.writer, "Invoice generated: {}", invoice.message)
            .context("Failed to write invoice")?;
        if let Some(path) = &invoice.invoice_path {
            writeln!(self.writer, "- Saved to: {}", path).context("Failed to write invoice")?;
        }
        if let Some(url) = &invoice.download_url {
            writeln!(self.writer, "- Download: {}{}", self.base_url, url)
                .context("Failed to write invoice")?;
        }

        Ok(())
    }

    fn show_health(&mut self, health: &HealthStatus) -> Result<()> {
        writeln!(self.writer, "- {}: {}", health.status, health.timestamp)
            .context("Failed to write health status")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    use super::{ConsoleMarkdownList, ConsolePresenter};
    use crate::datetime::format_clock;
    use crate::invoice::{InvoiceLineItem, InvoiceResponse, Selection};
    use crate::time_entry::{BreakdownEntry, TimeEntry, TodaySummary};

    /// テスト用にダミーのTimeEntryを作成する。
    fn dummy_entry(pattern: u8) -> TimeEntry {
        match pattern {
            1 => TimeEntry {
                id: "1".to_string(),
                client: "Acme".to_string(),
                project: "Site".to_string(),
                description: "design".to_string(),
                start_time: Utc.with_ymd_and_hms(2021, 1, 1, 1, 0, 0).unwrap(),
                end_time: Some(Utc.with_ymd_and_hms(2021, 1, 1, 2, 30, 0).unwrap()),
                duration_minutes: Some(90),
                is_running: false,
            },
            2 => TimeEntry {
                id: "2".to_string(),
                client: "Globex".to_string(),
                project: "Api".to_string(),
                description: String::new(),
                start_time: Utc.with_ymd_and_hms(2021, 1, 1, 3, 0, 0).unwrap(),
                end_time: None,
                duration_minutes: None,
                is_running: true,
            },
            _ => panic!("Invalid pattern: {}", pattern),
        }
    }

    fn render(f: impl FnOnce(&mut ConsoleMarkdownList<Vec<u8>>)) -> String {
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, "http://localhost:8080");
        f(&mut presenter);
        String::from_utf8(writer).unwrap()
    }

    #[test]
    fn test_show_timer() {
        let entry = dummy_entry(1);

        let running = render(|p| p.show_timer(Some(&entry)).unwrap());
        let idle = render(|p| p.show_timer(None).unwrap());

        assert_eq!(
            running,
            format!(
                "- Running: Acme - Site: design (since {})\n",
                format_clock(&entry.start_time)
            )
        );
        assert_eq!(idle, "- No timer running\n");
    }

    #[rstest]
    #[case::no_entry(&[], Selection::new(), String::new())]
    #[case::stopped_selected(
        &[dummy_entry(1)],
        [0].into_iter().collect(),
        format!(
            "- [x] 0: Acme - Site ({} ~ {}, 1h 30m)\n  - design\n",
            format_clock(&dummy_entry(1).start_time),
            format_clock(&dummy_entry(1).end_time.unwrap()),
        ),
    )]
    #[case::running_unselected(
        &[dummy_entry(1), dummy_entry(2)],
        [0].into_iter().collect(),
        format!(
            "- [x] 0: Acme - Site ({} ~ {}, 1h 30m)\n  - design\n- [ ] 1: Globex - Api ({} ~ now, running)\n",
            format_clock(&dummy_entry(1).start_time),
            format_clock(&dummy_entry(1).end_time.unwrap()),
            format_clock(&dummy_entry(2).start_time),
        ),
    )]
    fn test_show_time_entries(
        #[case] input: &[TimeEntry],
        #[case] selection: Selection,
        #[case] expected: String,
    ) {
        let output = render(|p| p.show_time_entries(input, &selection).unwrap());

        assert_eq!(output, expected);
    }

    #[test]
    fn test_show_summary() {
        let summary = TodaySummary {
            total_hours: 2.5,
            total_minutes: 150,
            entry_count: 2,
            breakdown: Some(vec![BreakdownEntry {
                client_project: "Acme - Site".to_string(),
                hours: 2.5,
                minutes: 150,
            }]),
        };

        let output = render(|p| p.show_summary(&summary).unwrap());

        assert_eq!(
            output,
            "## Today\n- Total: 2h 30m (2.50h)\n- Entries: 2\n- Average: 1h 15m\n  - Acme - Site: 2h 30m (2.50h)\n"
        );
    }

    #[test]
    fn test_show_summary_without_entries() {
        let summary = TodaySummary {
            total_hours: 0.0,
            total_minutes: 0,
            entry_count: 0,
            breakdown: None,
        };

        let output = render(|p| p.show_summary(&summary).unwrap());

        assert_eq!(output, "## Today\n- Total: 0h 0m (0.00h)\n- Entries: 0\n");
    }

    #[test]
    fn test_show_line_items() {
        let items = vec![
            InvoiceLineItem {
                description: "Site - design".to_string(),
                hours: 2.0,
                rate: 60.0,
                amount: 120.0,
            },
            InvoiceLineItem {
                description: "Api".to_string(),
                hours: 0.35,
                rate: 33.333,
                amount: 11.67,
            },
        ];

        let output = render(|p| p.show_line_items(&items).unwrap());

        assert_eq!(
            output,
            "- Site - design: 2.00h x 60.00 = 120.00\n- Api: 0.35h x 33.33 = 11.67\nTotal: 131.67\n"
        );
    }

    #[test]
    fn test_show_invoice() {
        let invoice = InvoiceResponse {
            success: true,
            message: "Invoice generated".to_string(),
            invoice_path: None,
            download_url: Some("/api/invoice/download/inv-1.pdf".to_string()),
            filename: Some("inv-1.pdf".to_string()),
            error: None,
        };

        let output = render(|p| p.show_invoice(&invoice).unwrap());

        assert_eq!(
            output,
            "Invoice generated: Invoice generated\n- Download: http://localhost:8080/api/invoice/download/inv-1.pdf\n"
        );
    }
}
