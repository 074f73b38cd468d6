//! Fixed-capacity rolling window over `f64` samples with O(1) amortized
//! mean/population-standard-deviation, via a running sum and sum-of-squares
//! over a circular buffer. This mirrors the offset-buffer approach used for
//! the fair-price median elsewhere in this codebase, but here the stream is
//! the Gaussian-ish metric series, not a single scalar series needing an
//! exact median -- so a running-moment accumulator outperforms re-sorting
//! on every tick.

pub struct RollingWindow {
    capacity: usize,
    samples: Vec<f64>,
    head: usize,
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
            head: 0,
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Append a sample, evicting the oldest once at capacity.
    pub fn push(&mut self, value: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(value);
            self.sum += value;
            self.sum_sq += value * value;
        } else {
            let evicted = self.samples[self.head];
            self.sum -= evicted;
            self.sum_sq -= evicted * evicted;
            self.samples[self.head] = value;
            self.sum += value;
            self.sum_sq += value * value;
        }
        self.head = (self.head + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Population standard deviation (divides by `N`, not `N-1`), clamped
    /// to zero to absorb floating-point drift that could otherwise yield a
    /// tiny negative variance.
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = (self.sum_sq / self.count as f64) - mean * mean;
        variance.max(0.0).sqrt()
    }
}
