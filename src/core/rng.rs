/// Keyed source of uniform draws for demo profiles.
///
/// Draws depend only on the key, never on call order or wall-clock time, so a
/// longer simulation reproduces every draw of a shorter one.
pub trait RandomSource {
    /// Uniform value in the open interval (0, 1).
    fn unit(&self, client_id: &str, period_index: u32) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededRandom {
    seed: u64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for SeededRandom {
    fn unit(&self, client_id: &str, period_index: u32) -> f64 {
        let mut rng = Rng::new(derive_seed(self.seed, client_id, period_index));
        rng.next_f64()
    }
}

fn derive_seed(base_seed: u64, client_id: &str, period_index: u32) -> u64 {
    let mixed = base_seed ^ fnv1a(client_id) ^ ((period_index as u64) << 32);
    splitmix64(mixed)
}

fn fnv1a(text: &str) -> u64 {
    const OFFSET: u64 = 0xCBF2_9CE4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;
    text.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }
}
