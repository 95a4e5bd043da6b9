//! Cron expression parsing and evaluation.

use crate::error::{CronError, CronResult};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Parsed cron expression.
///
/// Accepts standard 5-field (minute-first) and 6-field (seconds-first)
/// specs. 5-field input is normalized by prepending a `0` seconds field, so
/// `*/5 * * * *` fires at second 0 of every fifth minute.
#[derive(Debug, Clone)]
pub struct CronExpression {
    schedule: Schedule,
    expression: String,
}

impl CronExpression {
    /// Parse a cron expression.
    ///
    /// # Examples
    ///
    /// ```
    /// use pricewire_cron::CronExpression;
    ///
    /// // Every 5 minutes (5-field form)
    /// let expr = CronExpression::parse("*/5 * * * *").unwrap();
    ///
    /// // Every day at midnight (6-field form)
    /// let expr = CronExpression::parse("0 0 0 * * *").unwrap();
    /// ```
    pub fn parse(expression: &str) -> CronResult<Self> {
        let normalized = Self::normalize(expression)?;
        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| CronError::InvalidExpression(format!("{}: {}", expression, e)))?;

        Ok(Self {
            schedule,
            expression: expression.to_string(),
        })
    }

    /// Prepend the seconds field to 5-field expressions.
    fn normalize(expression: &str) -> CronResult<String> {
        match expression.split_whitespace().count() {
            5 => Ok(format!("0 {}", expression.trim())),
            6 | 7 => Ok(expression.trim().to_string()),
            n => Err(CronError::InvalidExpression(format!(
                "{}: expected 5 or 6 fields, got {}",
                expression, n
            ))),
        }
    }

    /// Get the next execution time strictly after the given time.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Get the next execution time from now.
    pub fn next(&self) -> Option<DateTime<Utc>> {
        self.next_after(Utc::now())
    }

    /// Get the expression string as originally written.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_five_field() {
        assert!(CronExpression::parse("*/5 * * * *").is_ok());
        assert!(CronExpression::parse("0 9 * * MON-FRI").is_ok());
    }

    #[test]
    fn test_parse_six_field() {
        assert!(CronExpression::parse("0 */5 * * * *").is_ok());
        assert!(CronExpression::parse("30 0 0 1 * *").is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(CronExpression::parse("invalid").is_err());
        assert!(CronExpression::parse("* * *").is_err());
        assert!(CronExpression::parse("0 * * * * * * *").is_err());
        assert!(CronExpression::parse("61 * * * *").is_err());
    }

    #[test]
    fn test_normalization_preserves_original() {
        let expr = CronExpression::parse("*/5 * * * *").unwrap();
        assert_eq!(expr.expression(), "*/5 * * * *");
    }

    #[test]
    fn test_five_field_fires_on_minute_boundary() {
        let expr = CronExpression::parse("*/5 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 15, 10, 1, 30).unwrap();

        let next = expr.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 15, 10, 5, 0).unwrap());
    }

    #[test]
    fn test_next_is_strictly_after() {
        let expr = CronExpression::parse("*/5 * * * *").unwrap();
        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 15, 10, 5, 0).unwrap();

        let next = expr.next_after(on_boundary).unwrap();
        assert!(next > on_boundary);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 15, 10, 10, 0).unwrap());
    }

    #[test]
    fn test_next_from_now_exists() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        assert!(expr.next().is_some());
    }
}
