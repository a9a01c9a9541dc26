//! Shadertoy-style uniforms for the custom shader chain.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::shader_types::PostUniforms;

const SECONDS_PER_DAY: u64 = 86_400;

/// Time base for `iTime`, `iTimeDelta` and `iFrame`.
#[derive(Debug, Clone, Copy)]
pub(super) struct PostClock {
    start: Instant,
    last: Instant,
    frame: i32,
}

impl PostClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            frame: 0,
        }
    }

    /// Advance one frame and return `(time, delta, frame)`.
    pub fn tick(&mut self) -> (f32, f32, i32) {
        let now = Instant::now();
        let time = now.duration_since(self.start).as_secs_f32();
        let delta = now.duration_since(self.last).as_secs_f32();
        let frame = self.frame;
        self.last = now;
        self.frame = self.frame.wrapping_add(1);
        (time, delta, frame)
    }
}

/// Build the post uniforms for a `width` x `height` target.
///
/// `mouse` is in pixels with y growing down; it is flipped for backends
/// whose shaders see y growing up.
pub(super) fn uniforms(
    clock: &mut PostClock,
    size: (u32, u32),
    mouse: Option<[f32; 2]>,
    y_is_down: bool,
) -> PostUniforms {
    let (time, time_delta, frame) = clock.tick();
    let (w, h) = (size.0 as f32, size.1 as f32);
    let mouse = mouse.map_or([0.0; 4], |[x, y]| {
        let y = if y_is_down { y } else { h - y };
        [x, y, 0.0, 0.0]
    });
    PostUniforms {
        resolution: [w, h, 1.0, 0.0],
        time,
        time_delta,
        frame,
        _padding: 0.0,
        mouse,
        date: date_now(),
    }
}

/// `[year, month (0-11), day (1-31), seconds since midnight]` in UTC.
fn date_now() -> [f32; 4] {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let days = (secs / SECONDS_PER_DAY as f64).floor() as i64;
    let (year, month, day) = civil_from_days(days);
    let seconds = secs - (days as f64 * SECONDS_PER_DAY as f64);
    [year as f32, (month - 1) as f32, day as f32, seconds as f32]
}

/// Proleptic Gregorian date of a day count since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        // Leap day
        assert_eq!(civil_from_days(19_782), (2024, 2, 29));
        assert_eq!(civil_from_days(-1), (1969, 12, 31));
    }

    #[test]
    fn test_mouse_flip_and_frame_counter() {
        let mut clock = PostClock::new();
        let a = uniforms(&mut clock, (100, 50), Some([10.0, 5.0]), false);
        assert_eq!(a.mouse, [10.0, 45.0, 0.0, 0.0]);
        assert_eq!(a.resolution[..2], [100.0, 50.0]);
        assert_eq!(a.frame, 0);

        let b = uniforms(&mut clock, (100, 50), Some([10.0, 5.0]), true);
        assert_eq!(b.mouse, [10.0, 5.0, 0.0, 0.0]);
        assert_eq!(b.frame, 1);
        assert!(b.time >= a.time);

        let none = uniforms(&mut clock, (100, 50), None, true);
        assert_eq!(none.mouse, [0.0; 4]);
    }

    #[test]
    fn test_date_is_plausible() {
        let [year, month, day, secs] = date_now();
        assert!(year >= 2024.0);
        assert!((0.0..12.0).contains(&month));
        assert!((1.0..=31.0).contains(&day));
        assert!((0.0..86_400.0).contains(&secs));
    }
}
