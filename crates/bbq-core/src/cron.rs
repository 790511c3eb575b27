//! Tokenized 5-field cron patterns and the minute-boundary match predicate.
//!
//! Supported token syntax per field: `*`, `*/n`, and comma lists of numbers
//! or `a-b` ranges. Named shorthand patterns (`daily`, `hourly`, `monday`, …)
//! expand to their 5-field form before parsing.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::CronError;

/// One parsed cron field. `allowed == None` means wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronField {
    pub token: String,
    allowed: Option<BTreeSet<u32>>,
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match &self.allowed {
            None => true,
            Some(set) => set.contains(&value),
        }
    }
}

/// Parsed 5-field cron form: minute, hour, day of month, month, day of week
/// (Sunday = 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronPattern {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
}

impl CronPattern {
    /// Parse a pattern, expanding named shorthands first.
    pub fn parse(pattern: &str) -> Result<Self, CronError> {
        let expanded = expand_named(pattern.trim());
        let tokens: Vec<&str> = expanded.split_whitespace().collect();
        if tokens.len() != 5 {
            return Err(CronError::FieldCount(tokens.len()));
        }
        Ok(Self {
            minute: parse_field("minute", tokens[0], 0, 59)?,
            hour: parse_field("hour", tokens[1], 0, 23)?,
            day_of_month: parse_field("dayOfMonth", tokens[2], 1, 31)?,
            month: parse_field("month", tokens[3], 1, 12)?,
            day_of_week: parse_field("dayOfWeek", tokens[4], 0, 7)?,
        })
    }

    /// Evaluate the pattern against the current minute in the given timezone.
    pub fn is_time_to_run(&self, tz: Tz, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&tz);
        // 7 is accepted as an alias for Sunday at parse time; match on 0-6.
        let dow = local.weekday().num_days_from_sunday();
        self.minute.matches(local.minute())
            && self.hour.matches(local.hour())
            && self.day_of_month.matches(local.day())
            && self.month.matches(local.month())
            && (self.day_of_week.matches(dow) || (dow == 0 && self.day_of_week.matches(7)))
    }
}

fn expand_named(pattern: &str) -> String {
    let expanded = match pattern.to_ascii_lowercase().as_str() {
        "minutely" => "* * * * *",
        "hourly" => "0 * * * *",
        "daily" => "0 0 * * *",
        "weekly" => "0 0 * * 0",
        "monthly" => "0 0 1 * *",
        "yearly" => "0 0 1 1 *",
        "sunday" => "0 0 * * 0",
        "monday" => "0 0 * * 1",
        "tuesday" => "0 0 * * 2",
        "wednesday" => "0 0 * * 3",
        "thursday" => "0 0 * * 4",
        "friday" => "0 0 * * 5",
        "saturday" => "0 0 * * 6",
        _ => pattern,
    };
    expanded.to_string()
}

fn parse_field(name: &'static str, token: &str, min: u32, max: u32) -> Result<CronField, CronError> {
    let invalid = || CronError::InvalidToken {
        field: name,
        token: token.to_string(),
    };

    if token == "*" {
        return Ok(CronField {
            token: token.to_string(),
            allowed: None,
        });
    }

    let mut allowed = BTreeSet::new();

    if let Some(step) = token.strip_prefix("*/") {
        let step: u32 = step.parse().map_err(|_| invalid())?;
        if step == 0 {
            return Err(invalid());
        }
        let mut v = min;
        while v <= max {
            allowed.insert(v);
            v += step;
        }
    } else {
        for part in token.split(',') {
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.parse().map_err(|_| invalid())?;
                let hi: u32 = hi.parse().map_err(|_| invalid())?;
                if lo > hi || lo < min || hi > max {
                    return Err(invalid());
                }
                allowed.extend(lo..=hi);
            } else {
                let v: u32 = part.parse().map_err(|_| invalid())?;
                if v < min || v > max {
                    return Err(invalid());
                }
                allowed.insert(v);
            }
        }
        if allowed.is_empty() {
            return Err(invalid());
        }
    }

    Ok(CronField {
        token: token.to_string(),
        allowed: Some(allowed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn minutely_matches_every_minute() {
        let p = CronPattern::parse("minutely").unwrap();
        assert!(p.is_time_to_run(chrono_tz::UTC, at(2024, 3, 4, 12, 0)));
        assert!(p.is_time_to_run(chrono_tz::UTC, at(2024, 3, 4, 12, 1)));
    }

    #[test]
    fn named_patterns_expand() {
        let daily = CronPattern::parse("daily").unwrap();
        assert!(daily.is_time_to_run(chrono_tz::UTC, at(2024, 3, 4, 0, 0)));
        assert!(!daily.is_time_to_run(chrono_tz::UTC, at(2024, 3, 4, 0, 1)));

        // 2024-03-04 is a Monday.
        let monday = CronPattern::parse("monday").unwrap();
        assert!(monday.is_time_to_run(chrono_tz::UTC, at(2024, 3, 4, 0, 0)));
        assert!(!monday.is_time_to_run(chrono_tz::UTC, at(2024, 3, 5, 0, 0)));

        let yearly = CronPattern::parse("yearly").unwrap();
        assert!(yearly.is_time_to_run(chrono_tz::UTC, at(2024, 1, 1, 0, 0)));
        assert!(!yearly.is_time_to_run(chrono_tz::UTC, at(2024, 2, 1, 0, 0)));
    }

    #[test]
    fn step_ranges_and_lists() {
        let p = CronPattern::parse("*/15 9-17 1,15 * 1-5").unwrap();
        // Mon 2024-03-04 09:30 UTC is not the 1st or 15th.
        assert!(!p.is_time_to_run(chrono_tz::UTC, at(2024, 3, 4, 9, 30)));
        // Fri 2024-03-15 09:45.
        assert!(p.is_time_to_run(chrono_tz::UTC, at(2024, 3, 15, 9, 45)));
        // Off the 15-minute grid.
        assert!(!p.is_time_to_run(chrono_tz::UTC, at(2024, 3, 15, 9, 50)));
    }

    #[test]
    fn sunday_accepts_both_0_and_7() {
        // 2024-03-03 is a Sunday.
        for token in ["0 0 * * 0", "0 0 * * 7"] {
            let p = CronPattern::parse(token).unwrap();
            assert!(p.is_time_to_run(chrono_tz::UTC, at(2024, 3, 3, 0, 0)), "{token}");
        }
    }

    #[test]
    fn timezone_shifts_the_match() {
        let p = CronPattern::parse("0 9 * * *").unwrap();
        let nine_utc = at(2024, 6, 1, 9, 0);
        assert!(p.is_time_to_run(chrono_tz::UTC, nine_utc));
        // 09:00 UTC is 11:00 in Helsinki (EEST) — no match there.
        assert!(!p.is_time_to_run(chrono_tz::Europe::Helsinki, nine_utc));
        assert!(p.is_time_to_run(chrono_tz::Europe::Helsinki, at(2024, 6, 1, 6, 0)));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(matches!(
            CronPattern::parse("* * * *"),
            Err(CronError::FieldCount(4))
        ));
        assert!(matches!(
            CronPattern::parse("61 * * * *"),
            Err(CronError::InvalidToken { field: "minute", .. })
        ));
        assert!(CronPattern::parse("*/0 * * * *").is_err());
        assert!(CronPattern::parse("* * * * 9-1").is_err());
    }
}
