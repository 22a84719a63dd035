use std::sync::atomic::{AtomicU32, Ordering};

/// `f32` stored as its bit pattern in an `AtomicU32`.
///
/// Single scalars only: a reader sees some previously stored value, never a
/// torn one. Nothing here orders one field against another.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}
