//! State/action value table with retrospective updates

use ahash::HashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{ActionKey, ActionPattern, StateKey};
use crate::decoder::{ChannelBias, OutputChannel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    /// Step size toward the target value
    pub learning_rate: f32,
    /// Weight of the best value of the next state
    pub discount: f32,
    /// Probability of leaving the network's choice alone even when confident
    pub exploration: f32,
    /// Total visits of a state before its values are trusted
    pub confidence_visits: u32,
    /// Bias applied to a channel that disagrees with the best known action
    pub correction_strength: f32,
    /// Reward given on death
    pub death_penalty: f32,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount: 0.9,
            exploration: 0.1,
            confidence_visits: 3,
            correction_strength: 0.25,
            death_penalty: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QEntry {
    pub value: f32,
    pub visits: u32,
}

/// Convergence diagnostics; never read by control logic
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QStats {
    pub iterations: u64,
    pub best_reward: f32,
    pub best_reward_iteration: u64,
}

impl Default for QStats {
    fn default() -> Self {
        // Any first reward, negative ones included, becomes the best
        Self {
            iterations: 0,
            best_reward: f32::MIN,
            best_reward_iteration: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QTable {
    entries: HashMap<StateKey, HashMap<ActionKey, QEntry>>,
    stats: QStats,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of (state, action) pairs
    pub fn len(&self) -> usize {
        self.entries.values().map(|actions| actions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state_count(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> &QStats {
        &self.stats
    }

    pub(crate) fn set_stats(&mut self, stats: QStats) {
        self.stats = stats;
    }

    pub fn entry(&self, state: &StateKey, action: &ActionKey) -> Option<QEntry> {
        self.entries.get(state)?.get(action).copied()
    }

    pub fn value(&self, state: &StateKey, action: &ActionKey) -> Option<f32> {
        self.entry(state, action).map(|e| e.value)
    }

    pub fn insert(&mut self, state: StateKey, action: ActionKey, entry: QEntry) {
        self.entries.entry(state).or_default().insert(action, entry);
    }

    /// Best value known for `state`, 0 for unseen states
    pub fn max_value(&self, state: &StateKey) -> f32 {
        self.entries
            .get(state)
            .and_then(|actions| actions.values().map(|e| e.value).reduce(f32::max))
            .unwrap_or(0.0)
    }

    /// Highest valued action of `state`; ties go to the smaller key
    pub fn best_action(&self, state: &StateKey) -> Option<(&ActionKey, QEntry)> {
        self.entries.get(state)?.iter().fold(None, |best, (action, &entry)| match best {
            Some((best_action, best_entry)) => {
                let better = entry.value > best_entry.value
                    || (entry.value == best_entry.value && action < best_action);
                if better {
                    Some((action, entry))
                } else {
                    Some((best_action, best_entry))
                }
            }
            None => Some((action, entry)),
        })
    }

    fn visits(&self, state: &StateKey) -> u32 {
        self.entries
            .get(state)
            .map(|actions| actions.values().map(|e| e.visits).sum())
            .unwrap_or(0)
    }

    /// Move `Q(previous, action)` toward `reward + discount * max Q(next, _)`.
    ///
    /// Only transitions whose outcome has already been observed are updated,
    /// so the table always trails live decisions by one frame.
    pub fn observe(
        &mut self,
        config: &QLearningConfig,
        previous: &StateKey,
        action: &ActionKey,
        reward: f32,
        next: &StateKey,
    ) {
        let target = reward + config.discount * self.max_value(next);
        self.update(config, previous, action, reward, target);
    }

    /// Update for a transition that ended the episode (no next state)
    pub fn observe_terminal(
        &mut self,
        config: &QLearningConfig,
        previous: &StateKey,
        action: &ActionKey,
        reward: f32,
    ) {
        self.update(config, previous, action, reward, reward);
    }

    fn update(
        &mut self,
        config: &QLearningConfig,
        state: &StateKey,
        action: &ActionKey,
        reward: f32,
        target: f32,
    ) {
        let entry = self
            .entries
            .entry(state.clone())
            .or_default()
            .entry(action.clone())
            .or_default();
        entry.value += config.learning_rate * (target - entry.value);
        entry.visits = entry.visits.saturating_add(1);

        self.stats.iterations += 1;
        if reward > self.stats.best_reward {
            self.stats.best_reward = reward;
            self.stats.best_reward_iteration = self.stats.iterations;
            log::trace!(
                "New best reward {:.3} at iteration {}",
                reward,
                self.stats.iterations
            );
        }
    }

    /// Bias that steers the decoder from `proposed` toward the best known
    /// action of `state`.
    ///
    /// No bias is produced for states with too few visits, on exploration
    /// draws, or when the proposal already is the best action.
    pub fn select_correction<R: Rng + ?Sized>(
        &self,
        config: &QLearningConfig,
        state: &StateKey,
        proposed: &ActionPattern,
        rng: &mut R,
    ) -> ChannelBias {
        if self.visits(state) < config.confidence_visits {
            return ChannelBias::none();
        }
        if rng.random::<f32>() < config.exploration {
            return ChannelBias::none();
        }
        let Some((best_key, best_entry)) = self.best_action(state) else {
            return ChannelBias::none();
        };
        let Some(best) = ActionPattern::parse(best_key) else {
            return ChannelBias::none();
        };
        if best == *proposed {
            return ChannelBias::none();
        }
        if let Some(proposed_value) = self.value(state, &proposed.key())
            && proposed_value >= best_entry.value
        {
            return ChannelBias::none();
        }

        let strength = config.correction_strength;
        let mut bias = ChannelBias::none();
        bias.set(OutputChannel::MoveX, strength * f32::from(best.x - proposed.x));
        bias.set(OutputChannel::MoveY, strength * f32::from(best.y - proposed.y));
        for channel in OutputChannel::ALL {
            let Some(button) = channel.button() else {
                continue;
            };
            match (best.buttons.contains(button), proposed.buttons.contains(button)) {
                (true, false) => bias.set(channel, strength),
                (false, true) => bias.set(channel, -strength),
                _ => {}
            }
        }
        bias
    }

    /// Every entry as a flat record, sorted by key
    pub fn records(&self) -> Vec<(StateKey, ActionKey, QEntry)> {
        let mut records: Vec<_> = self
            .entries
            .iter()
            .flat_map(|(state, actions)| {
                actions
                    .iter()
                    .map(move |(action, &entry)| (state.clone(), action.clone(), entry))
            })
            .collect();
        records.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Buttons;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn config() -> QLearningConfig {
        QLearningConfig {
            learning_rate: 0.5,
            discount: 0.5,
            exploration: 0.0,
            confidence_visits: 1,
            correction_strength: 0.25,
            death_penalty: 10.0,
        }
    }

    #[test]
    fn test_observe_moves_toward_target() {
        let mut table = QTable::new();
        let (s1, s2, a) = (StateKey::from("s1"), StateKey::from("s2"), ActionKey::from("a"));
        table.insert(s2.clone(), ActionKey::from("b"), QEntry { value: 4.0, visits: 1 });

        table.observe(&config(), &s1, &a, 1.0, &s2);

        // target = 1 + 0.5 * 4 = 3, value = 0 + 0.5 * 3
        assert_eq!(table.value(&s1, &a), Some(1.5));
        assert_eq!(table.entry(&s1, &a).unwrap().visits, 1);
    }

    #[test]
    fn test_terminal_update_ignores_future() {
        let mut table = QTable::new();
        let (s, a) = (StateKey::from("s"), ActionKey::from("a"));
        table.observe_terminal(&config(), &s, &a, -10.0);
        assert_eq!(table.value(&s, &a), Some(-5.0));
    }

    #[test]
    fn test_stats_track_best_reward() {
        let mut table = QTable::new();
        let (s, a) = (StateKey::from("s"), ActionKey::from("a"));
        table.observe(&config(), &s, &a, 1.0, &s);
        table.observe(&config(), &s, &a, 5.0, &s);
        table.observe(&config(), &s, &a, 2.0, &s);

        let stats = table.stats();
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.best_reward, 5.0);
        assert_eq!(stats.best_reward_iteration, 2);
    }

    #[test]
    fn test_stats_track_best_of_negative_rewards() {
        let mut table = QTable::new();
        let (s, a) = (StateKey::from("s"), ActionKey::from("a"));
        table.observe(&config(), &s, &a, -3.0, &s);
        table.observe(&config(), &s, &a, -1.5, &s);
        table.observe_terminal(&config(), &s, &a, -10.0);

        let stats = table.stats();
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.best_reward, -1.5);
        assert_eq!(stats.best_reward_iteration, 2);
    }

    #[test]
    fn test_correction_steers_toward_best_action() {
        let mut table = QTable::new();
        let state = StateKey::from("s");
        let best = ActionPattern {
            x: 1,
            y: 0,
            buttons: Buttons::JUMP,
        };
        table.insert(state.clone(), best.key(), QEntry { value: 2.0, visits: 4 });

        let proposed = ActionPattern {
            x: -1,
            y: 0,
            buttons: Buttons::GRAB,
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let bias = table.select_correction(&config(), &state, &proposed, &mut rng);

        assert_eq!(bias.get(OutputChannel::MoveX), 0.5);
        assert_eq!(bias.get(OutputChannel::MoveY), 0.0);
        assert_eq!(bias.get(OutputChannel::Jump), 0.25);
        assert_eq!(bias.get(OutputChannel::Grab), -0.25);
        assert_eq!(bias.get(OutputChannel::Dash), 0.0);
    }

    #[test]
    fn test_no_correction_without_confidence() {
        let mut table = QTable::new();
        let state = StateKey::from("s");
        let best = ActionPattern {
            x: 1,
            y: 0,
            buttons: Buttons::empty(),
        };
        table.insert(state.clone(), best.key(), QEntry { value: 2.0, visits: 1 });

        let config = QLearningConfig {
            confidence_visits: 5,
            ..config()
        };
        let proposed = ActionPattern {
            x: 0,
            y: 0,
            buttons: Buttons::empty(),
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert!(table.select_correction(&config, &state, &proposed, &mut rng).is_none());
    }

    #[test]
    fn test_records_are_sorted() {
        let mut table = QTable::new();
        table.insert("b".into(), "x".into(), QEntry::default());
        table.insert("a".into(), "y".into(), QEntry::default());
        table.insert("a".into(), "x".into(), QEntry::default());

        let keys: Vec<_> = table
            .records()
            .into_iter()
            .map(|(s, a, _)| format!("{s}/{a}"))
            .collect();
        assert_eq!(keys, vec!["a/x", "a/y", "b/x"]);
    }
}
