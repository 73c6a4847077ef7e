use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// External services that are throttled independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    GuideFetch,
    Reasoning,
    LengthLookup,
    Platform,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::GuideFetch => "guide_fetch",
            Service::Reasoning => "reasoning",
            Service::LengthLookup => "length_lookup",
            Service::Platform => "platform",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Slot {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

/// Minimum-interval limiter with one slot per service.
///
/// The slot's lock is held across the whole check/sleep/record sequence, so
/// two callers on the same key are serialized while other keys proceed.
pub struct RateLimiter {
    slots: HashMap<Service, Slot>,
}

impl RateLimiter {
    pub fn new(intervals: impl IntoIterator<Item = (Service, Duration)>) -> Self {
        let slots = intervals
            .into_iter()
            .map(|(service, interval)| {
                (
                    service,
                    Slot {
                        interval,
                        last_call: Mutex::new(None),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// A limiter that never waits.
    #[cfg(test)]
    pub fn unlimited() -> Self {
        Self::new([])
    }

    #[cfg(test)]
    pub fn interval(&self, service: Service) -> Duration {
        self.slots
            .get(&service)
            .map(|slot| slot.interval)
            .unwrap_or(Duration::ZERO)
    }

    /// Wait until `service` may be called again, then record the call.
    pub async fn acquire(&self, service: Service) {
        let Some(slot) = self.slots.get(&service) else {
            return;
        };

        let mut last = slot.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < slot.interval {
                let wait_time = slot.interval - elapsed;
                tracing::debug!(
                    service = %service,
                    wait_ms = wait_time.as_millis() as u64,
                    "Rate limiting: waiting"
                );
                sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}
