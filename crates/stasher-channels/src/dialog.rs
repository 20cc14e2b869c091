//! Per-chat scheduling dialog: time → duration → optional source TXID.
//!
//! Each step either advances the state, or keeps it and explains what was
//! wrong with the input. Only the final step yields a task.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq)]
pub enum Dialog {
    AwaitingScheduleTime,
    AwaitingDuration {
        schedule_time: DateTime<FixedOffset>,
    },
    AwaitingSourceTxId {
        schedule_time: DateTime<FixedOffset>,
        return_time: DateTime<FixedOffset>,
    },
}

/// Result of feeding one message to a dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Moved on; ask the next question.
    Next(Dialog, String),
    /// Bad input; same state, tell the operator why.
    Retry(Dialog, String),
    /// All answers collected.
    Done {
        schedule_time: DateTime<FixedOffset>,
        return_time: DateTime<FixedOffset>,
        source_tx_id: Option<String>,
    },
}

impl Dialog {
    pub fn prompt(offset: &FixedOffset) -> String {
        format!(
            "⏳ Enter delegation date and time as:\n`YYYY-MM-DD HH:MM`\n(interpreted as UTC{})",
            format_offset(offset)
        )
    }

    pub fn advance(self, input: &str, offset: &FixedOffset, now: DateTime<FixedOffset>) -> Step {
        let input = input.trim();
        match self {
            Dialog::AwaitingScheduleTime => match parse_local_time(input, offset) {
                Some(schedule_time) if schedule_time <= now => {
                    Step::Retry(self, "❌ The time must be in the future.".into())
                }
                Some(schedule_time) => Step::Next(
                    Dialog::AwaitingDuration { schedule_time },
                    "⏳ Enter hold duration in whole minutes (e.g. `6`):".into(),
                ),
                None => Step::Retry(self, "❌ Invalid date format, try again: `YYYY-MM-DD HH:MM`".into()),
            },
            Dialog::AwaitingDuration { schedule_time } => match input
                .parse::<i64>()
                .ok()
                .and_then(|m| return_after(schedule_time, m))
            {
                Some(return_time) => Step::Next(
                    Dialog::AwaitingSourceTxId {
                        schedule_time,
                        return_time,
                    },
                    "🔗 Enter the source transaction hash this window belongs to, or `-` to skip:".into(),
                ),
                None => Step::Retry(
                    self,
                    "❌ Enter a positive whole number of minutes (e.g. 30, 90, 120).".into(),
                ),
            },
            Dialog::AwaitingSourceTxId {
                schedule_time,
                return_time,
            } => {
                if input == "-" {
                    Step::Done {
                        schedule_time,
                        return_time,
                        source_tx_id: None,
                    }
                } else if is_tx_hash(input) {
                    Step::Done {
                        schedule_time,
                        return_time,
                        source_tx_id: Some(input.to_lowercase()),
                    }
                } else {
                    Step::Retry(
                        self,
                        "❌ A transaction hash is 64 hex characters. Send `-` to skip.".into(),
                    )
                }
            }
        }
    }
}

/// Parse `YYYY-MM-DD HH:MM` as wall-clock time in `offset`.
pub fn parse_local_time(input: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(input, TIME_FORMAT).ok()?;
    offset.from_local_datetime(&naive).single()
}

/// `schedule_time` plus a positive number of minutes, if it is representable.
pub fn return_after(schedule_time: DateTime<FixedOffset>, minutes: i64) -> Option<DateTime<FixedOffset>> {
    if minutes <= 0 {
        return None;
    }
    schedule_time.checked_add_signed(Duration::try_minutes(minutes)?)
}

/// A whole window given at once, with the same rules as the dialog.
pub fn parse_window(
    at: &str,
    minutes: i64,
    offset: &FixedOffset,
    now: DateTime<FixedOffset>,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), String> {
    let schedule_time = parse_local_time(at.trim(), offset)
        .ok_or_else(|| format!("invalid time '{at}', expected YYYY-MM-DD HH:MM"))?;
    if schedule_time <= now {
        return Err(format!("{at} is not in the future"));
    }
    let return_time = return_after(schedule_time, minutes)
        .ok_or_else(|| format!("{minutes} is not a usable number of minutes"))?;
    Ok((schedule_time, return_time))
}

pub fn is_tx_hash(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// `+3`, `-5`, `+5:30`
pub fn format_offset(offset: &FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    if secs % 3600 == 0 {
        format!("{sign}{}", secs / 3600)
    } else {
        format!("{sign}{}:{:02}", secs / 3600, (secs % 3600) / 60)
    }
}
