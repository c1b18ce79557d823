//! Progress reporting for a provisioning run.
//!
//! Percentages flow from the provisioner to an optional observer. The
//! reporter guarantees that, within one run, the observer never sees a value
//! lower than one it has already seen.

use std::sync::Mutex;

/// Observer receiving integer percentages in `0..=100`.
pub type ProgressSink = dyn Fn(u8) + Send + Sync;

/// Monotonic wrapper around an optional [`ProgressSink`].
pub struct ProgressReporter<'a> {
    sink: Option<&'a ProgressSink>,
    last: Mutex<Option<u8>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: Option<&'a ProgressSink>) -> Self {
        Self {
            sink,
            last: Mutex::new(None),
        }
    }

    /// Forwards `percent` if it moves progress forward.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if last.is_some_and(|prev| percent <= prev) {
            return;
        }
        *last = Some(percent);
        drop(last);

        if let Some(sink) = self.sink {
            sink(percent);
        }
    }

    /// Reports completion.
    pub fn finish(&self) {
        self.report(100);
    }

    /// Last value forwarded to the observer.
    pub fn current(&self) -> Option<u8> {
        match self.last.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Position of `done` out of `total` inside the band `[start, end]`.
///
/// Rounds half away from zero. A zero `total` yields `end`.
pub fn band(start: u8, end: u8, done: u64, total: u64) -> u8 {
    if total == 0 {
        return end;
    }
    let width = f64::from(end.saturating_sub(start));
    let fraction = (done.min(total) as f64) / (total as f64);
    let value = f64::from(start) + (fraction * width).round();
    value.clamp(0.0, 100.0) as u8
}
