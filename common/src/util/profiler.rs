use std::time::Instant;

pub struct ScopedTimer {
    name: String,
    start: Instant,
}

impl ScopedTimer {
    /// Names are owned so per-net timers can carry the net name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::info!("{} took {:?}", self.name, self.start.elapsed());
    }
}
