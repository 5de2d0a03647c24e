/// Bounds a walk that is expected to terminate on its own, e.g. climbing a hierarchy that
/// should be acyclic. Each [StepLimit::step] consumes one step, and returns false once the
/// limit has been exceeded.
#[derive(Copy, Clone, Debug)]
pub struct StepLimit {
    taken: usize,
    max: usize,
}

impl StepLimit {
    pub const fn new(max: usize) -> Self {
        Self { taken: 0, max }
    }

    #[must_use]
    pub fn step(&mut self) -> bool {
        self.taken += 1;
        self.taken <= self.max
    }

    pub const fn taken(&self) -> usize {
        self.taken
    }

    pub const fn max(&self) -> usize {
        self.max
    }
}
