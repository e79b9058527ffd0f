//=========================================================================
// Easing
//=========================================================================
//
// Progress curves for tweens. Every curve maps 0 to 0 and 1 to 1; the
// back and elastic variants overshoot in between.
//
//=========================================================================

use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

//=== Easing ==============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InSine,
    OutSine,
    InOutSine,
    InBack,
    OutBack,
    InOutBack,
    OutElastic,
    OutBounce,
}

const BACK_OVERSHOOT: f32 = 1.70158;

impl Easing {
    pub const ALL: [Easing; 15] = [
        Easing::Linear,
        Easing::InQuad,
        Easing::OutQuad,
        Easing::InOutQuad,
        Easing::InCubic,
        Easing::OutCubic,
        Easing::InOutCubic,
        Easing::InSine,
        Easing::OutSine,
        Easing::InOutSine,
        Easing::InBack,
        Easing::OutBack,
        Easing::InOutBack,
        Easing::OutElastic,
        Easing::OutBounce,
    ];

    /// Eased progress for `t` in `[0, 1]`; `t` outside the range is clamped.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            Easing::Linear => t,
            Easing::InQuad => t * t,
            Easing::OutQuad => 1.0 - (1.0 - t).powi(2),
            Easing::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (2.0 - 2.0 * t).powi(2) / 2.0
                }
            }
            Easing::InCubic => t * t * t,
            Easing::OutCubic => 1.0 - (1.0 - t).powi(3),
            Easing::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (2.0 - 2.0 * t).powi(3) / 2.0
                }
            }
            Easing::InSine => 1.0 - (t * PI / 2.0).cos(),
            Easing::OutSine => (t * PI / 2.0).sin(),
            Easing::InOutSine => (1.0 - (PI * t).cos()) / 2.0,
            Easing::InBack => {
                let c3 = BACK_OVERSHOOT + 1.0;
                c3 * t * t * t - BACK_OVERSHOOT * t * t
            }
            Easing::OutBack => {
                let c3 = BACK_OVERSHOOT + 1.0;
                let u = t - 1.0;
                1.0 + c3 * u * u * u + BACK_OVERSHOOT * u * u
            }
            Easing::InOutBack => {
                let c2 = BACK_OVERSHOOT * 1.525;
                if t < 0.5 {
                    (2.0 * t).powi(2) * ((c2 + 1.0) * 2.0 * t - c2) / 2.0
                } else {
                    ((2.0 * t - 2.0).powi(2) * ((c2 + 1.0) * (2.0 * t - 2.0) + c2) + 2.0) / 2.0
                }
            }
            Easing::OutElastic => out_elastic(t),
            Easing::OutBounce => out_bounce(t),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::InQuad => "in_quad",
            Easing::OutQuad => "out_quad",
            Easing::InOutQuad => "in_out_quad",
            Easing::InCubic => "in_cubic",
            Easing::OutCubic => "out_cubic",
            Easing::InOutCubic => "in_out_cubic",
            Easing::InSine => "in_sine",
            Easing::OutSine => "out_sine",
            Easing::InOutSine => "in_out_sine",
            Easing::InBack => "in_back",
            Easing::OutBack => "out_back",
            Easing::InOutBack => "in_out_back",
            Easing::OutElastic => "out_elastic",
            Easing::OutBounce => "out_bounce",
        }
    }
}

fn out_elastic(t: f32) -> f32 {
    if t <= 0.0 {
        0.0
    } else if t >= 1.0 {
        1.0
    } else {
        let c4 = (2.0 * PI) / 3.0;
        2.0_f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
    }
}

fn out_bounce(t: f32) -> f32 {
    const N1: f32 = 7.5625;
    const D1: f32 = 2.75;

    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984375
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Easing {
    type Err = String;

    /// Accepts the snake_case names plus the short aliases
    /// `ease_in`/`ease_out`/`ease_in_out` (cubic).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "ease_in" => return Ok(Easing::InCubic),
            "ease_out" => return Ok(Easing::OutCubic),
            "ease_in_out" => return Ok(Easing::InOutCubic),
            _ => {}
        }
        Easing::ALL
            .into_iter()
            .find(|e| e.name() == name)
            .ok_or_else(|| format!("unknown easing '{s}'"))
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
