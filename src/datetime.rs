use chrono::{DateTime, Local, NaiveDate, Utc};

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}


#[cfg(test)]
pub use mock_datetime::now;

/// 請求書の生成日。UTCの日付とする。
pub fn today() -> NaiveDate {
    now().date_naive()
}

/// 分数を`{h}h {m}m`形式にする。
pub fn format_duration(minutes: u32) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// 時刻をLocalタイムゾーンの`HH:MM`形式にする。
pub fn format_clock(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M").to_string()
}
