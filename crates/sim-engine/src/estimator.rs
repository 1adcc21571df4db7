//! Conservative throughput and latency estimation.
//!
//! Both estimators take `(download_time, throughput, latency)` samples and
//! report a deliberately pessimistic aggregate: the minimum throughput and
//! the maximum latency across every configured window or half-life.

/// Sample sink shared by the session runner and the ABR strategies.
pub trait ThroughputHistory {
    /// Record one completed download: pure transfer time in ms, measured
    /// throughput in bits/ms, time-to-first-bit in ms.
    fn push(&mut self, download_time: f64, throughput: f64, latency: f64);

    /// Current conservative throughput estimate, `None` before any sample.
    fn throughput(&self) -> Option<f64>;

    /// Current conservative latency estimate, `None` before any sample.
    fn latency(&self) -> Option<f64>;
}

const MAX_STORE: usize = 20;

/// Sliding-window estimator: mean over the tail of the last `k` samples,
/// minimized (throughput) / maximized (latency) over all configured `k`.
#[derive(Debug)]
pub struct SlidingWindow {
    window_sizes: Vec<usize>,
    throughputs: Vec<f64>,
    latencies: Vec<f64>,
    throughput: Option<f64>,
    latency: Option<f64>,
}

impl SlidingWindow {
    pub fn new(window_sizes: Vec<usize>) -> Self {
        let window_sizes = if window_sizes.is_empty() {
            vec![3]
        } else {
            window_sizes
        };
        Self {
            window_sizes,
            throughputs: Vec::new(),
            latencies: Vec::new(),
            throughput: None,
            latency: None,
        }
    }

    fn tail_mean(samples: &[f64], window: usize) -> f64 {
        let n = window.min(samples.len()).max(1);
        let tail = &samples[samples.len() - n..];
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

impl ThroughputHistory for SlidingWindow {
    fn push(&mut self, _download_time: f64, throughput: f64, latency: f64) {
        self.throughputs.push(throughput);
        self.latencies.push(latency);
        if self.throughputs.len() > MAX_STORE {
            let excess = self.throughputs.len() - MAX_STORE;
            self.throughputs.drain(..excess);
            self.latencies.drain(..excess);
        }

        let mut tput: Option<f64> = None;
        let mut lat: Option<f64> = None;
        for &window in &self.window_sizes {
            let t = Self::tail_mean(&self.throughputs, window);
            tput = Some(match tput {
                None => t,
                Some(v) => v.min(t),
            });
            let l = Self::tail_mean(&self.latencies, window);
            lat = Some(match lat {
                None => l,
                Some(v) => v.max(l),
            });
        }
        self.throughput = tput;
        self.latency = lat;
    }

    fn throughput(&self) -> Option<f64> {
        self.throughput
    }

    fn latency(&self) -> Option<f64> {
        self.latency
    }
}

/// Double-EWMA estimator with zero-bias correction.
///
/// Throughput samples are weighted by transfer time against half-lives in
/// ms; latency samples are weighted per-sample against the same half-lives
/// scaled by `1/segment_time`. The raw EWMA is divided by
/// `1 - 0.5^(W/half_life)` (`W` = cumulative weight) to remove the warm-up
/// bias toward zero.
#[derive(Debug)]
pub struct Ewma {
    half_life: Vec<f64>,
    latency_half_life: Vec<f64>,
    throughput_ewma: Vec<f64>,
    weight_throughput: f64,
    latency_ewma: Vec<f64>,
    weight_latency: f64,
    throughput: Option<f64>,
    latency: Option<f64>,
}

impl Ewma {
    pub const DEFAULT_HALF_LIFE: [f64; 2] = [8000.0, 3000.0];

    pub fn new(half_life_ms: Vec<f64>, segment_time: f64) -> Self {
        let half_life = if half_life_ms.is_empty() {
            Self::DEFAULT_HALF_LIFE.to_vec()
        } else {
            half_life_ms
        };
        let latency_half_life = half_life.iter().map(|h| h / segment_time).collect();
        let levels = half_life.len();
        Self {
            half_life,
            latency_half_life,
            throughput_ewma: vec![0.0; levels],
            weight_throughput: 0.0,
            latency_ewma: vec![0.0; levels],
            weight_latency: 0.0,
            throughput: None,
            latency: None,
        }
    }
}

impl ThroughputHistory for Ewma {
    fn push(&mut self, download_time: f64, throughput: f64, latency: f64) {
        for i in 0..self.half_life.len() {
            let alpha = 0.5f64.powf(download_time / self.half_life[i]);
            self.throughput_ewma[i] = alpha * self.throughput_ewma[i] + (1.0 - alpha) * throughput;
            let alpha = 0.5f64.powf(1.0 / self.latency_half_life[i]);
            self.latency_ewma[i] = alpha * self.latency_ewma[i] + (1.0 - alpha) * latency;
        }

        self.weight_throughput += download_time;
        self.weight_latency += 1.0;

        let mut tput: Option<f64> = None;
        let mut lat: Option<f64> = None;
        for i in 0..self.half_life.len() {
            let zero_factor = 1.0 - 0.5f64.powf(self.weight_throughput / self.half_life[i]);
            let t = self.throughput_ewma[i] / zero_factor;
            tput = Some(match tput {
                None => t,
                Some(v) => v.min(t),
            });
            let zero_factor = 1.0 - 0.5f64.powf(self.weight_latency / self.latency_half_life[i]);
            let l = self.latency_ewma[i] / zero_factor;
            lat = Some(match lat {
                None => l,
                Some(v) => v.max(l),
            });
        }
        self.throughput = tput;
        self.latency = lat;
    }

    fn throughput(&self) -> Option<f64> {
        self.throughput
    }

    fn latency(&self) -> Option<f64> {
        self.latency
    }
}
