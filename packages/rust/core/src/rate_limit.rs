//! Per-channel outbound send limiter over a rolling window.
//!
//! Constructed once with the pipeline. Each channel keeps the instants of
//! its recent sends; [`SendRateLimiter::sweep`] drops expired instants and
//! empty channels so the map never outgrows the active window.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use leadflow_shared::{Channel, LeadflowError, Result};
use tracing::warn;

/// Full sweeps run every this many acquisitions.
const SWEEP_EVERY: u64 = 64;

pub struct SendRateLimiter {
    /// `0` disables limiting.
    max_per_window: u32,
    window: Duration,
    state: Mutex<LimiterState>,
}

#[derive(Default)]
struct LimiterState {
    sends: HashMap<Channel, VecDeque<Instant>>,
    acquisitions: u64,
}

/// A reserved send slot; hand it back with [`SendRateLimiter::release`] if
/// the send never happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSlot {
    channel: Channel,
    at: Instant,
}

impl SendRateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// `max_per_hour` sends per channel in any rolling hour.
    pub fn per_hour(max_per_hour: u32) -> Self {
        Self::new(max_per_hour, Duration::from_secs(3600))
    }

    /// Reserve a send slot on `channel`, or fail with `RateLimited`.
    pub fn try_acquire(&self, channel: Channel) -> Result<SendSlot> {
        self.try_acquire_at(channel, Instant::now())
    }

    fn try_acquire_at(&self, channel: Channel, now: Instant) -> Result<SendSlot> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.acquisitions += 1;
        if state.acquisitions % SWEEP_EVERY == 0 {
            sweep_state(&mut state, self.window, now);
        }

        let sends = state.sends.entry(channel).or_default();
        prune(sends, self.window, now);

        if self.max_per_window > 0 && sends.len() >= self.max_per_window as usize {
            let oldest = sends.front().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            warn!(%channel, retry_after_secs = retry_after.as_secs(), "send rate limit reached");
            return Err(LeadflowError::RateLimited {
                channel: channel.to_string(),
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        sends.push_back(now);
        Ok(SendSlot { channel, at: now })
    }

    /// Return a slot whose send did not go out.
    pub fn release(&self, slot: SendSlot) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sends) = state.sends.get_mut(&slot.channel) {
            if let Some(pos) = sends.iter().rposition(|t| *t == slot.at) {
                sends.remove(pos);
            }
        }
    }

    /// Drop expired sends and channels with none left. Returns the number of
    /// channels still tracked.
    pub fn sweep(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        sweep_state(&mut state, self.window, Instant::now());
        state.sends.len()
    }

    /// Sends counted against `channel` in the current window.
    pub fn in_window(&self, channel: Channel) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        state.sends.get(&channel).map_or(0, |sends| {
            sends
                .iter()
                .filter(|t| now.duration_since(**t) < self.window)
                .count()
        })
    }
}

fn prune(sends: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while sends
        .front()
        .is_some_and(|t| now.duration_since(*t) >= window)
    {
        sends.pop_front();
    }
}

fn sweep_state(state: &mut LimiterState, window: Duration, now: Instant) {
    state.sends.retain(|_, sends| {
        prune(sends, window, now);
        !sends.is_empty()
    });
}
