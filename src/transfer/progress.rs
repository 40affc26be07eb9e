//! Progress accounting for export and import runs.

use std::fmt;

type ProgressCallback = Box<dyn FnMut(f64) + Send>;

/// Counts processed, succeeded and failed entities of one transfer step.
///
/// Steps run one after another; the listener is plain in-process state
/// with an optional callback receiving the fraction done.
#[derive(Default)]
pub struct ProgressListener {
    total: usize,
    done: usize,
    success: usize,
    failed: usize,
    callback: Option<ProgressCallback>,
}

impl ProgressListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listener reporting `done / total` after every processed entity.
    #[must_use]
    pub fn with_callback(callback: impl FnMut(f64) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            ..Self::default()
        }
    }

    /// Start a new step with `total` entities. Resets every counter.
    pub fn init(&mut self, total: usize) {
        self.total = total;
        self.done = 0;
        self.success = 0;
        self.failed = 0;
    }

    pub fn one_done(&mut self, n: usize) {
        self.done += n;
        if self.total > 0 {
            if let Some(callback) = self.callback.as_mut() {
                #[allow(clippy::cast_precision_loss)]
                callback(self.done as f64 / self.total as f64);
            }
        }
    }

    pub fn one_success(&mut self, n: usize) {
        self.success += n;
    }

    pub fn one_failed(&mut self, n: usize) {
        self.failed += n;
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub const fn done(&self) -> usize {
        self.done
    }

    #[must_use]
    pub const fn success(&self) -> usize {
        self.success
    }

    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }
}

impl fmt::Debug for ProgressListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressListener")
            .field("total", &self.total)
            .field("done", &self.done)
            .field("success", &self.success)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_counters_and_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut listener = ProgressListener::with_callback(move |p| sink.lock().unwrap().push(p));

        listener.one_done(1);
        assert!(seen.lock().unwrap().is_empty(), "no callback before init");

        listener.init(4);
        listener.one_done(1);
        listener.one_success(1);
        listener.one_done(1);
        listener.one_failed(1);
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5]);
        assert_eq!((listener.success(), listener.failed(), listener.done()), (1, 1, 2));

        listener.init(2);
        assert_eq!((listener.success(), listener.failed(), listener.done()), (0, 0, 0));
        assert_eq!(listener.total(), 2);
    }
}
