use std::time::Duration;
use tokio::time::Instant;

use crate::timer::TimerSlot;
use crate::types::{ContentOffset, ScrollState};

/// Time the text rests before scrolling out
pub const IDLE_DELAY: Duration = Duration::from_millis(5000);
/// Scroll speed in pixels per second
pub const SCROLL_SPEED: f32 = 50.0;

/// Scrolls text that is wider than its container.
///
/// The cycle is Static -> MovingOut -> Jumping -> MovingIn -> Static. Every
/// state entry cancels the pending transition before scheduling the next, so
/// there is never more than one outstanding.
#[derive(Debug, Default)]
pub struct MarqueeController {
    state: ScrollState,
    offset: ContentOffset,
    container_width: f32,
    content_width: f32,
    overflow: bool,
    transition: TimerSlot<ScrollState>,
    torn_down: bool,
}

fn sanitize(width: f32) -> f32 {
    if width.is_finite() && width > 0.0 {
        width
    } else {
        0.0
    }
}

impl MarqueeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    pub fn offset(&self) -> ContentOffset {
        self.offset
    }

    pub fn is_overflow(&self) -> bool {
        self.overflow
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.transition.deadline()
    }

    /// Take new measurements (text changed or the viewport resized) and
    /// restart the cycle from rest.
    pub fn measure(&mut self, container_width: f32, content_width: f32, now: Instant) {
        if self.torn_down {
            return;
        }
        self.container_width = sanitize(container_width);
        self.content_width = sanitize(content_width);
        self.overflow = self.container_width > 0.0 && self.content_width > self.container_width;
        log::debug!(
            "Marquee measured content {:.1}px in container {:.1}px (overflow: {})",
            self.content_width,
            self.container_width,
            self.overflow
        );
        self.enter(ScrollState::Static, now);
    }

    fn enter(&mut self, state: ScrollState, now: Instant) {
        self.transition.cancel();

        if !self.overflow {
            self.state = ScrollState::Static;
            self.offset = ContentOffset::rest();
            return;
        }

        if self.state != state {
            log::debug!("Marquee {:?} -> {:?}", self.state, state);
        }
        self.state = state;

        match state {
            ScrollState::Static => {
                self.offset = ContentOffset::rest();
                self.transition
                    .schedule(now, IDLE_DELAY, ScrollState::MovingOut);
            }
            ScrollState::MovingOut => {
                let seconds = self.content_width / SCROLL_SPEED;
                self.offset = ContentOffset {
                    offset_pixels: -self.content_width,
                    transition_seconds: Some(seconds),
                };
                self.transition.schedule(
                    now,
                    Duration::from_secs_f32(seconds),
                    ScrollState::Jumping,
                );
            }
            ScrollState::Jumping => {
                self.offset = ContentOffset {
                    offset_pixels: self.container_width,
                    transition_seconds: None,
                };
                self.transition
                    .schedule(now, Duration::ZERO, ScrollState::MovingIn);
            }
            ScrollState::MovingIn => {
                let seconds = self.container_width / SCROLL_SPEED;
                self.offset = ContentOffset {
                    offset_pixels: 0.0,
                    transition_seconds: Some(seconds),
                };
                self.transition.schedule(
                    now,
                    Duration::from_secs_f32(seconds),
                    ScrollState::Static,
                );
            }
        }
    }

    /// Advance one transition if it is due. Returns true when the offset changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.torn_down {
            return false;
        }
        match self.transition.fire(now) {
            Some(next) => {
                self.enter(next, now);
                true
            }
            None => false,
        }
    }

    pub fn teardown(&mut self) {
        self.transition.cancel();
        self.torn_down = true;
    }
}
