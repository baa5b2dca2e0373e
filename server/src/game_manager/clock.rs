//! Dual countdown clock for one game.
//!
//! The clock never ticks on its own: the running side's remaining time is
//! computed from `running_since` whenever somebody looks, so observations are
//! exact at the moment they are taken. The session actor sleeps on
//! `flag_deadline()` to learn about flag-fall.

use shared::Color;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct ClockSnapshot {
    pub white_remaining: Duration,
    pub black_remaining: Duration,
    pub running: Color,
}

impl ClockSnapshot {
    pub fn remaining(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        }
    }
}

#[derive(Debug)]
pub struct Clock {
    white_remaining: Duration,
    black_remaining: Duration,
    running: Color,
    running_since: Instant,
    frozen: bool,
}

impl Clock {
    /// White's clock starts running at construction (the pairing instant).
    pub fn new(time_control_minutes: u32) -> Self {
        let budget = Duration::from_secs(u64::from(time_control_minutes) * 60);
        Self {
            white_remaining: budget,
            black_remaining: budget,
            running: Color::White,
            running_since: Instant::now(),
            frozen: false,
        }
    }

    fn live(&self, color: Color) -> Duration {
        let stored = match color {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        };
        if self.frozen || color != self.running {
            stored
        } else {
            stored.saturating_sub(self.running_since.elapsed())
        }
    }

    pub fn remaining(&self, color: Color) -> Duration {
        self.live(color)
    }

    pub fn running(&self) -> Color {
        self.running
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Read-only view; never mutates, so observers cannot race the debit.
    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            white_remaining: self.live(Color::White),
            black_remaining: self.live(Color::Black),
            running: self.running,
        }
    }

    /// Stops the running side, debits its elapsed time (clamped at zero) and
    /// starts the other side. No-op once frozen.
    pub fn switch(&mut self) {
        if self.frozen {
            return;
        }
        let now = Instant::now();
        self.debit(now);
        self.running = self.running.opposite();
        self.running_since = now;
    }

    /// Debits the running side and freezes the clock. Idempotent.
    pub fn stop(&mut self) {
        if self.frozen {
            return;
        }
        self.debit(Instant::now());
        self.frozen = true;
    }

    fn debit(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.running_since);
        match self.running {
            Color::White => {
                self.white_remaining = self.white_remaining.saturating_sub(elapsed)
            }
            Color::Black => {
                self.black_remaining = self.black_remaining.saturating_sub(elapsed)
            }
        }
    }

    /// The instant the running side's remaining time reaches zero. Already in
    /// the past when the side has flagged but nothing has observed it yet.
    pub fn flag_deadline(&self) -> Instant {
        let stored = match self.running {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        };
        self.running_since + stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn white_runs_first_and_is_debited_on_switch() {
        let mut clock = Clock::new(5);
        assert_eq!(clock.running(), Color::White);

        advance(Duration::from_secs(7)).await;
        let snap = clock.snapshot();
        assert_eq!(snap.white_remaining, Duration::from_secs(293));
        assert_eq!(snap.black_remaining, Duration::from_secs(300));

        clock.switch();
        assert_eq!(clock.running(), Color::Black);
        assert_eq!(clock.remaining(Color::White), Duration::from_secs(293));

        advance(Duration::from_secs(3)).await;
        assert_eq!(clock.remaining(Color::Black), Duration::from_secs(297));
        // The stopped side is not losing time.
        assert_eq!(clock.remaining(Color::White), Duration::from_secs(293));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_does_not_mutate() {
        let clock = Clock::new(1);
        advance(Duration::from_secs(10)).await;
        let a = clock.snapshot();
        let b = clock.snapshot();
        assert_eq!(a.white_remaining, b.white_remaining);
        assert_eq!(a.white_remaining, Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_clamps_at_zero_past_the_deadline() {
        let clock = Clock::new(1);
        advance(Duration::from_secs(90)).await;
        assert_eq!(clock.remaining(Color::White), Duration::ZERO);
        assert_eq!(clock.remaining(Color::Black), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_freezes_both_sides() {
        let mut clock = Clock::new(1);
        advance(Duration::from_secs(5)).await;
        clock.stop();
        let frozen_white = clock.remaining(Color::White);
        assert_eq!(frozen_white, Duration::from_secs(55));

        advance(Duration::from_secs(30)).await;
        clock.stop();
        clock.switch(); // no-op once frozen
        assert_eq!(clock.remaining(Color::White), frozen_white);
        assert_eq!(clock.remaining(Color::Black), Duration::from_secs(60));
        assert!(clock.is_frozen());
    }

    #[tokio::test(start_paused = true)]
    async fn total_time_is_conserved_across_switches() {
        let mut clock = Clock::new(2);
        for secs in [3, 11, 2, 29, 17] {
            advance(Duration::from_secs(secs)).await;
            clock.switch();
        }
        let snap = clock.snapshot();
        let total = snap.white_remaining + snap.black_remaining;
        assert_eq!(total, Duration::from_secs(240 - 62));
    }

    #[tokio::test(start_paused = true)]
    async fn flag_deadline_tracks_the_running_side() {
        let mut clock = Clock::new(1);
        let start = Instant::now();
        assert_eq!(clock.flag_deadline(), start + Duration::from_secs(60));

        advance(Duration::from_secs(20)).await;
        clock.switch();
        // Black now has its full 60s from the switch instant.
        assert_eq!(
            clock.flag_deadline(),
            start + Duration::from_secs(20) + Duration::from_secs(60)
        );
    }
}
