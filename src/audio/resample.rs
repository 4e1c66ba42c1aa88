//! Streaming polyphase rational resampler.
//!
//! Converts between integer sample rates by upsampling by `L`, low-pass
//! filtering and downsampling by `M`, where `L/M` is the reduced rate ratio.
//! Only the taps that touch real (non-stuffed) input samples are evaluated,
//! so each output sample costs `taps / L` multiply-adds.
//!
//! State carries across blocks: feeding a signal in pieces gives the same
//! output as feeding it whole, and the number of samples produced per block
//! varies (e.g. 159/160/161) as the phase walks.

/// Zero crossings of the sinc kernel on each side of the centre.
const HALF_ZERO_CROSSINGS: usize = 10;

/// Kaiser window shape parameter.
const KAISER_BETA: f64 = 5.0;

pub struct PolyphaseResampler {
    up: usize,
    down: usize,
    /// `phases[p][k]` = `h[p + k * up]`
    phases: Vec<Vec<f32>>,
    /// Input samples still needed by the filter; `history[0]` has absolute index `base`.
    history: Vec<f32>,
    base: u64,
    /// Total input samples consumed.
    consumed: u64,
    /// Index of the next output sample.
    next_output: u64,
    /// Filter centre, in upsampled samples.
    delay: u64,
}

impl PolyphaseResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let g = gcd(from_rate.max(1), to_rate.max(1));
        let up = (to_rate.max(1) / g) as usize;
        let down = (from_rate.max(1) / g) as usize;

        let (phases, delay) = if up == 1 && down == 1 {
            (vec![vec![1.0]], 0)
        } else {
            design_filter(up, down)
        };

        Self {
            up,
            down,
            phases,
            history: Vec::new(),
            base: 0,
            consumed: 0,
            next_output: 0,
            delay,
        }
    }

    /// Upsampling and downsampling factors `(L, M)`.
    pub fn ratio(&self) -> (usize, usize) {
        (self.up, self.down)
    }

    pub fn is_passthrough(&self) -> bool {
        self.up == 1 && self.down == 1
    }

    /// Feed one block and collect every output whose inputs are now available.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if self.is_passthrough() {
            self.consumed += input.len() as u64;
            return input.to_vec();
        }

        self.history.extend(input.iter().map(|&s| s as f32));
        self.consumed += input.len() as u64;

        let mut out = Vec::with_capacity(input.len() * self.up / self.down + 1);
        loop {
            let t = self.next_output * self.down as u64 + self.delay;
            let newest = t / self.up as u64;
            if newest >= self.consumed {
                break;
            }
            out.push(self.output_at(t));
            self.next_output += 1;
        }

        self.trim_history();
        out
    }

    /// Drain the filter tail after the last block.
    ///
    /// Emits outputs up to `ceil(consumed * L / M)` in total, treating input
    /// past the end as silence.
    pub fn finish(&mut self) -> Vec<i16> {
        if self.is_passthrough() {
            return Vec::new();
        }

        let total = (self.consumed * self.up as u64).div_ceil(self.down as u64);
        let mut out = Vec::new();
        while self.next_output < total {
            let t = self.next_output * self.down as u64 + self.delay;
            out.push(self.output_at(t));
            self.next_output += 1;
        }
        out
    }

    fn output_at(&self, t: u64) -> i16 {
        let phase = (t % self.up as u64) as usize;
        let newest = (t / self.up as u64) as i64;

        let mut acc = 0.0f32;
        for (k, &coeff) in self.phases[phase].iter().enumerate() {
            let idx = newest - k as i64;
            if idx < self.base as i64 {
                break;
            }
            if let Some(&x) = self.history.get((idx - self.base as i64) as usize) {
                acc += coeff * x;
            }
        }
        acc.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }

    /// Drop input samples that no future output can reach.
    fn trim_history(&mut self) {
        let taps = self.phases.iter().map(Vec::len).max().unwrap_or(1) as u64;
        let t = self.next_output * self.down as u64 + self.delay;
        let oldest_needed = (t / self.up as u64).saturating_sub(taps);
        if oldest_needed > self.base {
            let drop = ((oldest_needed - self.base) as usize).min(self.history.len());
            self.history.drain(..drop);
            self.base += drop as u64;
        }
    }
}

/// Kaiser-windowed sinc low-pass at the upsampled rate, split into `up` phases.
fn design_filter(up: usize, down: usize) -> (Vec<Vec<f32>>, u64) {
    let max_rate = up.max(down);
    let half_len = HALF_ZERO_CROSSINGS * max_rate;
    let len = 2 * half_len + 1;
    let cutoff = 1.0 / max_rate as f64;

    let denom = bessel_i0(KAISER_BETA);
    let taps: Vec<f64> = (0..len)
        .map(|n| {
            let m = n as f64 - half_len as f64;
            let x = m * cutoff;
            let sinc = if m == 0.0 {
                1.0
            } else {
                (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
            };
            let r = m / half_len as f64;
            let window = bessel_i0(KAISER_BETA * (1.0 - r * r).max(0.0).sqrt()) / denom;
            // Scale by `up` to restore the amplitude lost to zero stuffing.
            cutoff * sinc * window * up as f64
        })
        .collect();

    let phases = (0..up)
        .map(|p| {
            taps.iter()
                .skip(p)
                .step_by(up)
                .map(|&h| h as f32)
                .collect()
        })
        .collect();

    (phases, half_len as u64)
}

/// Zeroth-order modified Bessel function of the first kind.
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let half = x / 2.0;
    for k in 1..50 {
        term *= (half / k as f64) * (half / k as f64);
        sum += term;
        if term < sum * 1e-12 {
            break;
        }
    }
    sum
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
