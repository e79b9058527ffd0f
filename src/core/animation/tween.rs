//=========================================================================
// Tween
//=========================================================================

use std::fmt;
use std::str::FromStr;

use super::easing::Easing;

//=== LoopMode ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Once,
    Repeat,
    PingPong,
}

impl LoopMode {
    pub fn is_looping(self) -> bool {
        self != LoopMode::Once
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopMode::Once => "once",
            LoopMode::Repeat => "repeat",
            LoopMode::PingPong => "ping_pong",
        })
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" | "none" => Ok(LoopMode::Once),
            "repeat" | "loop" => Ok(LoopMode::Repeat),
            "ping_pong" | "pingpong" | "yoyo" => Ok(LoopMode::PingPong),
            _ => Err(format!("unknown loop mode '{s}'")),
        }
    }
}

//=== Tween ===============================================================

/// Interpolates one scalar from `from` to `to` over `duration` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Tween {
    from: f64,
    to: f64,
    duration: f32,
    elapsed: f32,
    easing: Easing,
    loop_mode: LoopMode,
    reversed: bool,
    finished: bool,
}

impl Tween {
    pub fn new(from: f64, to: f64, duration: f32) -> Self {
        Self {
            from,
            to,
            duration: duration.max(0.0),
            elapsed: 0.0,
            easing: Easing::default(),
            loop_mode: LoopMode::Once,
            reversed: false,
            finished: false,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn with_loop(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Value at the current clock position.
    pub fn value(&self) -> f64 {
        if self.finished {
            return self.to;
        }
        let t = if self.duration > 0.0 {
            self.elapsed / self.duration
        } else {
            1.0
        };
        let t = if self.reversed { 1.0 - t } else { t };
        let eased = f64::from(self.easing.apply(t));
        self.from + (self.to - self.from) * eased
    }

    /// Moves the clock forward. Returns `true` on the tick the tween
    /// finishes; a finished tween no longer moves.
    pub fn advance(&mut self, dt: f32) -> bool {
        if self.finished {
            return false;
        }
        self.elapsed += dt.max(0.0);

        if self.duration <= 0.0 {
            if self.loop_mode.is_looping() {
                self.elapsed = 0.0;
                return false;
            }
            self.finished = true;
            return true;
        }

        if self.elapsed < self.duration {
            return false;
        }

        match self.loop_mode {
            LoopMode::Once => {
                self.elapsed = self.duration;
                self.finished = true;
                true
            }
            LoopMode::Repeat => {
                self.elapsed %= self.duration;
                false
            }
            LoopMode::PingPong => {
                let cycles = (self.elapsed / self.duration).floor() as u64;
                self.elapsed %= self.duration;
                if cycles % 2 == 1 {
                    self.reversed = !self.reversed;
                }
                false
            }
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn once_tween_finishes_exactly_once() {
        let mut tween = Tween::new(0.0, 10.0, 1.0);
        assert!(!tween.advance(0.5));
        assert!(close(tween.value(), 5.0));

        assert!(tween.advance(0.6));
        assert!(close(tween.value(), 10.0));
        assert!(!tween.advance(1.0));
        assert!(tween.is_finished());
    }

    #[test]
    fn zero_duration_completes_on_first_tick() {
        let mut tween = Tween::new(3.0, 7.0, 0.0);
        assert!(tween.advance(0.016));
        assert!(close(tween.value(), 7.0));
    }

    #[test]
    fn repeat_wraps_and_never_finishes() {
        let mut tween = Tween::new(0.0, 1.0, 1.0).with_loop(LoopMode::Repeat);
        for _ in 0..10 {
            assert!(!tween.advance(0.75));
        }
        assert!(!tween.is_finished());
        // 7.5s into a 1s loop
        assert!(close(tween.value(), 0.5));
    }

    #[test]
    fn ping_pong_runs_back_down() {
        let mut tween = Tween::new(0.0, 1.0, 1.0).with_loop(LoopMode::PingPong);
        tween.advance(1.25);
        assert!(close(tween.value(), 0.75));
        tween.advance(1.0);
        assert!(close(tween.value(), 0.25));
    }

    #[test]
    fn easing_shapes_the_value() {
        let mut tween = Tween::new(0.0, 1.0, 1.0).with_easing(Easing::InQuad);
        tween.advance(0.5);
        assert!(close(tween.value(), 0.25));
    }

    #[test]
    fn loop_mode_parses_aliases() {
        assert_eq!("loop".parse::<LoopMode>(), Ok(LoopMode::Repeat));
        assert_eq!("pingpong".parse::<LoopMode>(), Ok(LoopMode::PingPong));
        assert!("sideways".parse::<LoopMode>().is_err());
    }
}
