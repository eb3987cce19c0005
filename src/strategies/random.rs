use rand::Rng;

/// Uniform pick over the whole host table.
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }

    pub fn pick_host(&self, host_count: usize) -> Option<usize> {
        if host_count == 0 {
            return None;
        }
        let mut rng = rand::thread_rng();
        Some(rng.gen_range(0..host_count))
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table() {
        assert_eq!(RandomStrategy::new().pick_host(0), None);
    }

    #[test]
    fn test_picks_within_table() {
        let strategy = RandomStrategy::new();
        let mut seen = [false; 4];
        for _ in 0..400 {
            let host = strategy.pick_host(4).unwrap();
            seen[host] = true;
        }
        assert!(seen.iter().all(|s| *s), "seen: {:?}", seen);
    }
}
