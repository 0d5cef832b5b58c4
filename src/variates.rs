use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use std::collections::HashMap;

/// Independent random streams used by the engine. Every server owns a
/// `Service` stream so its draws do not depend on routing decisions made
/// elsewhere in the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stream {
    Arrival,
    Routing,
    Selection,
    Service(u32),
}

impl Stream {
    fn id(self) -> u64 {
        match self {
            Stream::Arrival => 0,
            Stream::Routing => 1,
            Stream::Selection => 2,
            Stream::Service(id) => 3 + u64::from(id),
        }
    }
}

pub trait VariateSource {
    /// Binds subsequent draws to `stream`.
    fn select_stream(&mut self, stream: Stream);
    /// Uniform draw in `[a, b)`.
    fn uniform(&mut self, a: f64, b: f64) -> f64;
    fn exponential(&mut self, mean: f64) -> f64;
    /// Uniform integer in `[a, b]`.
    fn equilikely(&mut self, a: usize, b: usize) -> usize;
}

/// Default variate source: one seeded `StdRng` per stream, created on
/// first use from the planted seed.
pub struct StreamRng {
    seed: u64,
    current: Stream,
    streams: HashMap<Stream, StdRng>,
}

impl StreamRng {
    pub fn plant_seeds(seed: u64) -> Self {
        Self {
            seed,
            current: Stream::Arrival,
            streams: HashMap::new(),
        }
    }

    fn rng(&mut self) -> &mut StdRng {
        let seed = stream_seed(self.seed, self.current);
        self.streams
            .entry(self.current)
            .or_insert_with(|| StdRng::seed_from_u64(seed))
    }
}

impl VariateSource for StreamRng {
    fn select_stream(&mut self, stream: Stream) {
        self.current = stream;
    }

    fn uniform(&mut self, a: f64, b: f64) -> f64 {
        a + (b - a) * self.rng().gen::<f64>()
    }

    fn exponential(&mut self, mean: f64) -> f64 {
        // Rejected rates (non-positive or NaN mean) never fire.
        match Exp::new(1.0 / mean) {
            Ok(exp) => exp.sample(self.rng()),
            Err(_) => f64::INFINITY,
        }
    }

    fn equilikely(&mut self, a: usize, b: usize) -> usize {
        self.rng().gen_range(a..=b)
    }
}

// splitmix64 finaliser, spreads neighbouring stream ids over the seed space
fn stream_seed(seed: u64, stream: Stream) -> u64 {
    let mut z = seed ^ stream.id().wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
