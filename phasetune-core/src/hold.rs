//! Display hold for the last detected note.
//!
//! A tuner display should not flicker to blank between notes, so the last
//! valid result is kept until [`HOLD_FRAMES`] invalid frames in a row have
//! passed.

use crate::PitchResult;

/// Consecutive invalid frames tolerated before the held note is cleared.
pub const HOLD_FRAMES: u32 = 16;

#[derive(Debug, Clone, Default)]
pub struct NoteHold {
    held: PitchResult,
    invalid_frames: u32,
    locked: bool,
}

impl NoteHold {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame's result and returns what should be displayed.
    ///
    /// While locked, the held result is returned unchanged.
    pub fn update(&mut self, result: &PitchResult) -> &PitchResult {
        if self.locked {
            return &self.held;
        }

        if result.valid {
            self.held = *result;
            self.invalid_frames = 0;
        } else {
            self.invalid_frames = self.invalid_frames.saturating_add(1);
            if self.invalid_frames > HOLD_FRAMES && self.held.valid {
                log::debug!("Hold expired after {} invalid frames", self.invalid_frames);
                self.held = PitchResult::default();
            }
        }

        &self.held
    }

    pub fn current(&self) -> &PitchResult {
        &self.held
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Freezes or releases the display.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        self.invalid_frames = 0;
    }

    pub fn clear(&mut self) {
        self.held = PitchResult::default();
        self.invalid_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4() -> PitchResult {
        PitchResult {
            valid: true,
            frequency: 440.5,
            reference_frequency: 440.0,
            cents: 1.97,
            note: 57,
            octave: 4,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_clears_after_hold_period() {
        let mut hold = NoteHold::new();
        hold.update(&a4());

        let blank = PitchResult::default();
        for _ in 0..HOLD_FRAMES {
            assert!(hold.update(&blank).valid);
        }
        assert!(!hold.update(&blank).valid);
    }

    #[test]
    fn test_valid_frame_restarts_hold() {
        let mut hold = NoteHold::new();
        let blank = PitchResult::default();
        hold.update(&a4());
        for _ in 0..10 {
            hold.update(&blank);
        }
        hold.update(&a4());
        for _ in 0..10 {
            hold.update(&blank);
        }
        assert_eq!(*hold.current(), a4());
    }

    #[test]
    fn test_lock_freezes_display() {
        let mut hold = NoteHold::new();
        hold.update(&a4());
        hold.set_locked(true);

        let other = PitchResult { frequency: 220.0, note: 45, octave: 3, ..a4() };
        assert_eq!(*hold.update(&other), a4());
        for _ in 0..100 {
            hold.update(&PitchResult::default());
        }
        assert_eq!(*hold.current(), a4());

        hold.set_locked(false);
        assert_eq!(hold.update(&other).note, 45);
    }
}
