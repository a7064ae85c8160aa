//! Step cursor over a recorded execution.
//!
//! The service runs a program to completion and returns every step; the
//! debugger only walks that list. `step_over` shows the step at the
//! cursor and advances; showing the last step ends the session.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Debugger {
    active: bool,
    cursor: usize,
    shown: Option<usize>,
}

impl Debugger {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Index of the step whose variables are on screen.
    pub fn shown(&self) -> Option<usize> {
        self.shown
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn start(&mut self) {
        self.active = true;
        self.cursor = 0;
        self.shown = None;
    }

    /// Leave debugging mode. The last shown step stays on screen.
    pub fn stop(&mut self) {
        self.active = false;
        self.cursor = 0;
    }

    /// Forget everything, including the shown step.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Show the step at the cursor and advance. Returns the shown index,
    /// or `None` when the cursor was already past the end.
    pub fn step_over(&mut self, len: usize) -> Option<usize> {
        if !self.active {
            return None;
        }
        if self.cursor >= len {
            self.stop();
            return None;
        }
        let index = self.cursor;
        self.shown = Some(index);
        self.cursor += 1;
        if self.cursor >= len {
            self.stop();
        }
        Some(index)
    }

    /// Re-show the step before the one on screen.
    pub fn step_back(&mut self, len: usize) -> Option<usize> {
        if !self.active || self.cursor < 2 {
            return None;
        }
        self.cursor -= 2;
        self.step_over(len)
    }
}
