//! Pod-wide time grid: epoch, period, interval and granularity

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use rlpod_spec::{EpochSpec, PodParamsSpec};

use crate::config::WindowDefaults;
use crate::duration::{format_duration, parse_duration};
use crate::{PodError, Result};

/// A resolved data window
///
/// Always satisfies `0 < granularity <= interval <= period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    epoch: DateTime<Utc>,
    period: Duration,
    interval: Duration,
    granularity: Duration,
}

impl TimeWindow {
    /// Create a window, validating the ordering of its durations
    pub fn new(
        epoch: DateTime<Utc>,
        period: Duration,
        interval: Duration,
        granularity: Duration,
    ) -> Result<Self> {
        for (name, value) in [
            ("period", period),
            ("interval", interval),
            ("granularity", granularity),
        ] {
            if value <= Duration::zero() {
                return Err(PodError::config(format!(
                    "{name} must be positive, got {}",
                    format_duration(value)
                )));
            }
        }
        if granularity > interval {
            return Err(PodError::config(format!(
                "granularity ({}) must not exceed interval ({})",
                format_duration(granularity),
                format_duration(interval)
            )));
        }
        if interval > period {
            return Err(PodError::config(format!(
                "interval ({}) must not exceed period ({})",
                format_duration(interval),
                format_duration(period)
            )));
        }

        if epoch.checked_add_signed(period).is_none() {
            return Err(PodError::config(format!(
                "period ({}) from {epoch} is out of range",
                format_duration(period)
            )));
        }

        Ok(Self {
            epoch,
            period,
            interval,
            granularity,
        })
    }

    /// Start of the window
    #[must_use]
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Total span
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Query sub-window size
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Bucket size
    #[must_use]
    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    /// End of the window
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.epoch + self.period
    }

    /// Whether `ts` falls in `[epoch, end]`
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.epoch && ts <= self.end()
    }

    /// Round `ts` to the nearest grid boundary `epoch + k * granularity`; ties round up
    #[must_use]
    pub fn bucket(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.granularity.num_milliseconds();
        let offset = (ts - self.epoch).num_milliseconds();
        let rem = offset.rem_euclid(step);
        let mut aligned = offset - rem;
        if rem * 2 >= step {
            aligned += step;
        }
        self.epoch + Duration::milliseconds(aligned)
    }

    /// The `index`-th `[start, end)` span of `interval` within the period.
    ///
    /// The last span is shortened to end at [`TimeWindow::end`] and also
    /// holds that instant. Connectors that query upstream in batches issue
    /// one query per span.
    #[must_use]
    pub fn sub_window(&self, index: usize) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let offset = i64::try_from(index)
            .ok()?
            .checked_mul(self.interval.num_milliseconds())?;
        if offset >= self.period.num_milliseconds() {
            return None;
        }
        let start = self.epoch + Duration::milliseconds(offset);
        let end = self.end();
        let next = start.checked_add_signed(self.interval).map_or(end, |next| next.min(end));
        Some((start, next))
    }

    /// Index of the span holding `ts`, or `None` outside the window
    #[must_use]
    pub fn sub_window_index(&self, ts: DateTime<Utc>) -> Option<usize> {
        if !self.contains(ts) {
            return None;
        }
        let offset = (ts - self.epoch)
            .num_milliseconds()
            .min(self.period.num_milliseconds() - 1);
        usize::try_from(offset / self.interval.num_milliseconds()).ok()
    }
}

/// Resolve manifest parameters against defaults at instant `now`.
///
/// Without a pinned epoch the window ends at `now`, so repeated resolutions
/// slide forward.
pub fn resolve_window(
    params: Option<&PodParamsSpec>,
    defaults: &WindowDefaults,
    now: DateTime<Utc>,
) -> Result<TimeWindow> {
    let params = params.cloned().unwrap_or_default();

    let period = parse_duration(params.period.as_deref().unwrap_or(&defaults.period))?;
    let interval = parse_duration(params.interval.as_deref().unwrap_or(&defaults.interval))?;
    let granularity =
        parse_duration(params.granularity.as_deref().unwrap_or(&defaults.granularity))?;

    let epoch = match &params.epoch {
        Some(epoch) => parse_epoch(epoch)?,
        None => now.checked_sub_signed(period).ok_or_else(|| {
            PodError::config(format!(
                "period ({}) reaches before the earliest representable epoch",
                format_duration(period)
            ))
        })?,
    };

    let window = TimeWindow::new(epoch, period, interval, granularity)?;
    debug!(
        epoch = %window.epoch,
        period = %format_duration(period),
        interval = %format_duration(interval),
        granularity = %format_duration(granularity),
        "Resolved time window"
    );
    Ok(window)
}

fn parse_epoch(epoch: &EpochSpec) -> Result<DateTime<Utc>> {
    match epoch {
        EpochSpec::Unix(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .ok_or_else(|| PodError::config(format!("epoch {secs} is out of range"))),
        EpochSpec::Timestamp(text) => {
            if let Ok(secs) = text.trim().parse::<i64>() {
                return parse_epoch(&EpochSpec::Unix(secs));
            }
            DateTime::parse_from_rfc3339(text.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| PodError::config(format!("invalid epoch '{text}': {e}")))
        }
    }
}
