//! Unique display names for agents and species

use std::path::Path;

use ahash::{HashMap, HashSet};
use rand::SeedableRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Hands out names without repetition.
///
/// Base names are drawn in shuffled order first. Once they run out, a random
/// base gets a per-name counter appended (`Name1`, `Name2`, ...), skipping
/// anything already issued. An empty pool yields empty names.
#[derive(Debug, Clone)]
pub struct NamePool {
    base: Vec<String>,
    unused: Vec<String>,
    counters: HashMap<String, u32>,
    issued: HashSet<String>,
    rng: Xoshiro256PlusPlus,
}

impl NamePool {
    pub fn new(names: impl IntoIterator<Item = String>, seed: u64) -> Self {
        let mut seen = HashSet::default();
        let base: Vec<String> = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty() && seen.insert(n.clone()))
            .collect();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut unused = base.clone();
        unused.shuffle(&mut rng);

        Self {
            base,
            unused,
            counters: HashMap::default(),
            issued: HashSet::default(),
            rng,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    /// One name per line. A file that cannot be read gives an empty pool.
    pub fn from_file(path: &Path, seed: u64) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let pool = Self::new(contents.lines().map(str::to_string), seed);
                log::info!("Loaded {} names from {:?}", pool.len(), path);
                pool
            }
            Err(e) => {
                log::warn!("Could not read name list {:?}: {}, using empty pool", path, e);
                Self::empty()
            }
        }
    }

    /// Number of base names
    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn next_name(&mut self) -> String {
        if self.base.is_empty() {
            return String::new();
        }

        if let Some(name) = self.unused.pop() {
            self.issued.insert(name.clone());
            return name;
        }

        let Some(base) = self.base.choose(&mut self.rng).cloned() else {
            return String::new();
        };
        let counter = self.counters.entry(base.clone()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{base}{counter}");
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(names: &[&str]) -> NamePool {
        NamePool::new(names.iter().map(|s| s.to_string()), 42)
    }

    #[test]
    fn test_empty_pool_returns_empty_name() {
        let mut names = NamePool::empty();
        assert_eq!(names.next_name(), "");
        assert_eq!(names.next_name(), "");
    }

    #[test]
    fn test_base_names_come_first_without_repeats() {
        let mut names = pool(&["Ada", "Bo", "Cy"]);
        let mut drawn: Vec<String> = (0..3).map(|_| names.next_name()).collect();
        drawn.sort();
        assert_eq!(drawn, vec!["Ada", "Bo", "Cy"]);
    }

    #[test]
    fn test_suffix_skips_collisions() {
        let mut names = pool(&["Ada", "Ada1"]);
        let drawn: Vec<String> = (0..6).map(|_| names.next_name()).collect();

        let unique: HashSet<&String> = drawn.iter().collect();
        assert_eq!(unique.len(), drawn.len());
    }

    #[test]
    fn test_duplicate_and_blank_lines_ignored() {
        let names = pool(&["Ada", "", "  Ada ", "Bo"]);
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_missing_file_gives_empty_pool() {
        let dir = tempfile::tempdir().unwrap();
        let names = NamePool::from_file(&dir.path().join("nope.txt"), 1);
        assert!(names.is_empty());
    }
}
