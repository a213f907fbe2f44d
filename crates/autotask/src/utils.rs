use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::AutomationError;

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep_cancellable(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), AutomationError> {
    if cancel.is_cancelled() {
        return Err(AutomationError::Cancelled("cancelled before sleep".to_string()));
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(AutomationError::Cancelled(format!(
            "cancelled during {}ms sleep",
            duration.as_millis()
        ))),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Roughly 30 years, the point treated as "never" when a deadline overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant instead of panicking
/// on overflow.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Parse a comma separated list of integers, e.g. `"100, 200, 300"`.
pub fn parse_int_list(raw: &str) -> Result<Vec<i64>, AutomationError> {
    raw.split(',')
        .map(str::trim)
        .map(|part| {
            part.parse::<i64>().map_err(|_| {
                AutomationError::InvalidArgument(format!("Invalid number '{part}' in '{raw}'"))
            })
        })
        .collect()
}

/// Parse a non-negative millisecond count.
pub fn parse_millis(raw: &str) -> Result<Duration, AutomationError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| AutomationError::InvalidArgument(format!("Invalid duration '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_list_parsing() {
        assert_eq!(parse_int_list("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_int_list("1,,3").is_err());
        assert_eq!(parse_millis(" 250 ").unwrap(), Duration::from_millis(250));
        assert!(parse_millis("-5").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_saturates_instead_of_overflowing() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::from_millis(250)), now + Duration::from_millis(250));

        let never = deadline_after(Duration::MAX);
        assert!(never >= now + FAR_FUTURE);
        assert_eq!(deadline_after(Duration::ZERO), now);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_stops_on_cancel() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });
        let started = tokio::time::Instant::now();
        let result = sleep_cancellable(Duration::from_secs(60), &token).await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
