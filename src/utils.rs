use chrono::{Duration as ChronoDuration, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::Regex;

/// `HH:MM:SS`, `MM:SS`, `SS`(소수점 허용) 형식의 재생 위치
static POSITION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:(\d+):)?(\d{1,2}):)?(\d+(?:\.\d+)?)$").expect("Invalid position regex")
});

/// ====== 공통 로그 함수 (KST 기준) ======
pub fn log(msg: impl AsRef<str>) {
    let now = Utc::now() + ChronoDuration::hours(9);
    println!("{} {}", now.format("%Y-%m-%d %H:%M:%S"), msg.as_ref());
}

/// ====== 공통 Progress Bar 생성 함수 ======
/// 재생 위치(ms)를 표시하는 ProgressBar를 생성합니다.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

/// 밀리초를 `H:MM:SS` / `M:SS`로 표시합니다. 음수는 `-` 접두어.
pub fn format_duration(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let total_secs = ms.abs() / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}{}:{:02}:{:02}", sign, hours, minutes, seconds)
    } else {
        format!("{}{}:{:02}", sign, minutes, seconds)
    }
}

/// CLI에서 받은 재생 위치를 밀리초로 파싱합니다.
pub fn parse_position(input: &str) -> Option<i64> {
    let caps = POSITION_REGEX.captures(input.trim())?;

    let hours: i64 = caps.get(1).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let minutes: i64 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;

    if caps.get(2).is_some() && (minutes >= 60 || seconds >= 60.0) {
        return None;
    }

    Some((hours * 3600 + minutes * 60) * 1000 + (seconds * 1000.0).round() as i64)
}
