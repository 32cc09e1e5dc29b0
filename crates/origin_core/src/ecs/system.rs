//! # Systems
//!
//! Systems run once per world update in ascending priority order. Equal
//! priorities keep registration order. A system may run only every N ticks.

use std::time::{Duration, Instant};

use super::world::World;

/// A unit of per-tick game logic.
pub trait System: Send {
    /// Name used for timing stats and logs.
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Run only when `tick % n == 0`. `0` or `1` runs every tick.
    fn update_every_n_ticks(&self) -> u64 {
        0
    }

    /// Executes the system.
    fn run(&mut self, world: &mut World, dt: f32);
}

/// System backed by a closure.
pub struct FnSystem<F> {
    name: String,
    priority: i32,
    every_n_ticks: u64,
    run: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut World, f32) + Send,
{
    /// Wraps `run` as a system.
    pub fn new(name: impl Into<String>, priority: i32, run: F) -> Self {
        Self {
            name: name.into(),
            priority,
            every_n_ticks: 0,
            run,
        }
    }

    /// Runs the system only every `n` ticks.
    #[must_use]
    pub fn every_n_ticks(mut self, n: u64) -> Self {
        self.every_n_ticks = n;
        self
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World, f32) + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn update_every_n_ticks(&self) -> u64 {
        self.every_n_ticks
    }

    fn run(&mut self, world: &mut World, dt: f32) {
        (self.run)(world, dt);
    }
}

/// Accumulated run time of one system (or external phase).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemTimingStat {
    /// System name.
    pub name: String,
    /// Total time across `count` runs.
    pub duration_sum: Duration,
    /// Number of recorded runs.
    pub count: u64,
}

impl SystemTimingStat {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            duration_sum: Duration::ZERO,
            count: 0,
        }
    }

    /// Mean time per run.
    #[must_use]
    pub fn average(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.duration_sum / count,
            Err(_) => Duration::from_secs_f64(self.duration_sum.as_secs_f64() / self.count as f64),
        }
    }
}

/// Ordered system list plus timing accumulators.
#[derive(Default)]
pub(crate) struct Schedule {
    systems: Vec<Box<dyn System>>,
    stats: Vec<SystemTimingStat>,
    sorted: bool,
}

impl Schedule {
    pub(crate) fn add(&mut self, system: Box<dyn System>) {
        tracing::info!(
            system = system.name(),
            priority = system.priority(),
            every_n_ticks = system.update_every_n_ticks(),
            "system registered"
        );
        self.systems.push(system);
        self.sorted = false;
    }

    pub(crate) fn len(&self) -> usize {
        self.systems.len()
    }

    fn sort(&mut self) {
        // sort_by_key is stable: equal priorities keep registration order
        self.systems.sort_by_key(|s| s.priority());
        for system in &self.systems {
            if !self.stats.iter().any(|stat| stat.name == system.name()) {
                self.stats.push(SystemTimingStat::new(system.name()));
            }
        }
        self.sorted = true;
    }

    pub(crate) fn run(&mut self, world: &mut World, dt: f32, tick: u64) {
        if !self.sorted {
            self.sort();
        }
        for system in &mut self.systems {
            let every = system.update_every_n_ticks();
            if every > 1 && tick % every != 0 {
                continue;
            }
            let start = Instant::now();
            system.run(world, dt);
            let elapsed = start.elapsed();
            record(&mut self.stats, system.name(), elapsed);
        }
    }

    /// Moves systems and timings recorded on `other` into `self`.
    ///
    /// `other` is the placeholder left in the world while `self` runs.
    pub(crate) fn absorb(&mut self, other: &mut Self) {
        for system in other.systems.drain(..) {
            self.add(system);
        }
        for stat in other.stats.drain(..) {
            match self.stats.iter_mut().find(|s| s.name == stat.name) {
                Some(existing) => {
                    existing.duration_sum += stat.duration_sum;
                    existing.count += stat.count;
                }
                None => self.stats.push(stat),
            }
        }
    }

    pub(crate) fn add_external_timing(&mut self, name: &str, duration: Duration) {
        record(&mut self.stats, name, duration);
    }

    /// Returns accumulated stats and resets them.
    pub(crate) fn drain_stats(&mut self) -> Vec<SystemTimingStat> {
        let drained = self.stats.clone();
        for stat in &mut self.stats {
            stat.duration_sum = Duration::ZERO;
            stat.count = 0;
        }
        drained
    }
}

fn record(stats: &mut Vec<SystemTimingStat>, name: &str, duration: Duration) {
    let stat = match stats.iter().position(|s| s.name == name) {
        Some(pos) => &mut stats[pos],
        None => {
            stats.push(SystemTimingStat::new(name));
            let last = stats.len() - 1;
            &mut stats[last]
        }
    };
    stat.duration_sum += duration;
    stat.count += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average() {
        let stat = SystemTimingStat {
            name: "movement".into(),
            duration_sum: Duration::from_millis(30),
            count: 3,
        };
        assert_eq!(stat.average(), Duration::from_millis(10));
        assert_eq!(SystemTimingStat::new("idle").average(), Duration::ZERO);
    }

    #[test]
    fn test_record_accumulates() {
        let mut stats = Vec::new();
        record(&mut stats, "net", Duration::from_millis(2));
        record(&mut stats, "net", Duration::from_millis(3));
        record(&mut stats, "ai", Duration::from_millis(1));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].duration_sum, Duration::from_millis(5));
    }

    #[test]
    fn test_drain_resets() {
        let mut schedule = Schedule::default();
        schedule.add_external_timing("net", Duration::from_millis(4));
        let first = schedule.drain_stats();
        assert_eq!(first[0].count, 1);
        let second = schedule.drain_stats();
        assert_eq!(second[0].count, 0);
        assert_eq!(second[0].duration_sum, Duration::ZERO);
    }

    #[test]
    fn test_absorb_merges() {
        let mut main = Schedule::default();
        main.add_external_timing("net", Duration::from_millis(1));
        let mut pending = Schedule::default();
        pending.add_external_timing("net", Duration::from_millis(2));
        pending.add(Box::new(FnSystem::new("late", 0, |_: &mut World, _| {})));

        main.absorb(&mut pending);
        assert_eq!(main.len(), 1);
        assert_eq!(pending.len(), 0);
        let stats = main.drain_stats();
        assert_eq!(stats[0].duration_sum, Duration::from_millis(3));
        assert_eq!(stats[0].count, 2);
    }
}
