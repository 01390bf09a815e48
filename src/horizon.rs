use std::fmt;

/// Number of frame offsets a tracked object can look ahead or back on.
pub const HORIZON: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfHorizon(pub usize);

impl fmt::Display for OutOfHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame offset {} is past the {}-slot horizon", self.0, HORIZON)
    }
}

impl std::error::Error for OutOfHorizon {}

/// Fixed table indexed by frame offset.
///
/// Reads past the horizon are simply empty; writes past it are refused.
#[derive(Clone)]
pub struct Horizon<T> {
    slots: [Option<T>; HORIZON],
}

impl<T: fmt::Debug> fmt::Debug for Horizon<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| s.as_ref().map(|v| (i, v))),
            )
            .finish()
    }
}

impl<T> Default for Horizon<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Horizon<T> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx)?.as_ref()
    }

    /// Stores `value` at `idx`, returning what was there before.
    #[inline]
    pub fn set(&mut self, idx: usize, value: T) -> Result<Option<T>, OutOfHorizon> {
        let slot = self.slots.get_mut(idx).ok_or(OutOfHorizon(idx))?;

        Ok(slot.replace(value))
    }
}

impl<T: Copy> Horizon<T> {
    /// Memoized read: on first access `f` computes the value, which is
    /// stored only when it is `Some`.
    pub fn get_or_try_insert_with<F>(&mut self, idx: usize, f: F) -> Result<Option<T>, OutOfHorizon>
    where
        F: FnOnce() -> Option<T>,
    {
        let slot = self.slots.get_mut(idx).ok_or(OutOfHorizon(idx))?;
        if slot.is_none() {
            *slot = f();
        }

        Ok(*slot)
    }
}
