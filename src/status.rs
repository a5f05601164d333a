use std::time::{Duration, Instant};

use crate::schedule::{TimerHandle, TimerQueue};

const DOTS: &str = "...";

pub const ELLIPSIS_INTERVAL: Duration = Duration::from_millis(250);

/// Status line with an optional animated trailing ellipsis.
///
/// At most one ellipsis timer is alive: every `announce` clears the previous
/// one before deciding whether to start another.
pub struct InfoAnnouncer {
    text: String,
    dots: usize,
    timer: Option<TimerHandle>,
    timers: TimerQueue,
    interval: Duration,
}

impl InfoAnnouncer {
    pub fn new(initial: &str, interval: Duration) -> Self {
        Self {
            text: initial.to_string(),
            dots: 0,
            timer: None,
            timers: TimerQueue::new(),
            interval,
        }
    }

    pub fn announce(&mut self, text: &str, animated: bool, now: Instant) {
        if let Some(handle) = self.timer.take() {
            self.timers.clear_timeout(handle);
        }
        self.text = text.to_string();
        self.dots = 0;

        if animated {
            self.timer = Some(self.timers.set_timeout(now + self.interval));
        }
        log::debug!("status: {}", self.text);
    }

    /// Advance the ellipsis if its timer is due. Returns true when the
    /// displayed text changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for handle in self.timers.take_due(now) {
            if self.timer != Some(handle) {
                continue;
            }
            self.dots = (self.dots + 1) % (DOTS.len() + 1);
            self.timer = Some(self.timers.set_timeout(now + self.interval));
            changed = true;
        }
        changed
    }

    pub fn display(&self) -> String {
        format!("{}{}", self.text, &DOTS[..self.dots])
    }

    #[allow(dead_code)]
    pub fn is_animated(&self) -> bool {
        self.timer.is_some()
    }

    #[allow(dead_code)]
    pub fn is_error(&self) -> bool {
        self.text.starts_with('!')
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    #[allow(dead_code)]
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }
}

/// Where the status line ends up.
pub trait StatusDisplay {
    fn show(&mut self, line: &str);
}

impl StatusDisplay for indicatif::ProgressBar {
    fn show(&mut self, line: &str) {
        self.set_message(line.to_string());
    }
}
