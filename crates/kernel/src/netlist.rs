//! Wiring: signals, blocks and tasks assembled into a [`Simulation`]

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Result, SimError};
use crate::process::{Combinational, Process};
use crate::scheduler::{Simulation, TaskId};
use crate::signal::{Driver, Signal, SignalStore, SignalValue};

/// Index of a combinational block in wiring order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A design under construction
#[derive(Default)]
pub struct Netlist {
    store: SignalStore,
    blocks: Vec<Box<dyn Combinational>>,
    tasks: Vec<Box<dyn Process>>,
}

impl Netlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a signal with its reset value
    pub fn signal<T: SignalValue>(&mut self, name: impl Into<String>, init: T) -> Signal<T> {
        self.store.add(name.into(), init)
    }

    pub fn add_block<B: Combinational + 'static>(&mut self, block: B) -> BlockId {
        self.blocks.push(Box::new(block));
        BlockId(self.blocks.len() - 1)
    }

    /// Register a task; tasks are resumed in registration order within a delta
    pub fn spawn<P: Process + 'static>(&mut self, process: P) -> TaskId {
        self.tasks.push(Box::new(process));
        TaskId(self.tasks.len() - 1)
    }

    /// Read a signal's reset value before the design is built
    pub fn peek<T: SignalValue>(&self, signal: Signal<T>) -> Result<T> {
        self.store.get(signal)
    }

    pub fn signal_count(&self) -> usize {
        self.store.len()
    }

    /// Check drivers, order the blocks and hand everything to a [`Simulation`]
    pub fn build(mut self) -> Result<Simulation> {
        let n = self.blocks.len();

        // Every output has exactly one driving block
        for (i, block) in self.blocks.iter().enumerate() {
            for out in block.outputs() {
                if let Driver::Block(other) = self.store.driver(out)? {
                    return Err(SimError::MultipleDrivers {
                        signal: self.store.name(out).to_string(),
                        first: self.blocks[other].name().to_string(),
                        second: block.name().to_string(),
                    });
                }
                self.store.set_driver(out, Driver::Block(i))?;
            }
        }

        // Block-level dependencies through the signals they read
        let mut deps: Vec<HashSet<usize>> = Vec::with_capacity(n);
        let mut fanout: Vec<Vec<usize>> = vec![Vec::new(); self.store.len()];
        for (i, block) in self.blocks.iter().enumerate() {
            let mut block_deps = HashSet::new();
            for input in block.inputs() {
                if let Driver::Block(src) = self.store.driver(input)? {
                    block_deps.insert(src);
                }
                let readers = &mut fanout[input.index()];
                if !readers.contains(&i) {
                    readers.push(i);
                }
            }
            deps.push(block_deps);
        }

        let order = self.topological_order(&deps)?;

        debug!(
            signals = self.store.len(),
            blocks = n,
            tasks = self.tasks.len(),
            "Netlist built"
        );

        let block_names = self.blocks.iter().map(|b| b.name().to_string()).collect();
        Ok(Simulation::new(
            self.store,
            self.blocks,
            block_names,
            order,
            fanout,
            self.tasks,
        ))
    }

    /// Level-based topological sort; blocks at the same level keep wiring order.
    /// A block that (transitively) reads its own output is a combinational loop.
    fn topological_order(&self, deps: &[HashSet<usize>]) -> Result<Vec<usize>> {
        let n = deps.len();
        let mut level: Vec<Option<usize>> = vec![None; n];

        loop {
            let mut made_progress = false;
            for i in 0..n {
                if level[i].is_some() {
                    continue;
                }
                let mut max_dep_level = None;
                let mut all_deps_ready = true;
                for &dep in &deps[i] {
                    match level[dep] {
                        Some(lvl) => {
                            max_dep_level = Some(max_dep_level.map_or(lvl, |m: usize| m.max(lvl)))
                        }
                        None => {
                            all_deps_ready = false;
                            break;
                        }
                    }
                }
                if all_deps_ready {
                    level[i] = Some(max_dep_level.map_or(0, |m| m + 1));
                    made_progress = true;
                }
            }
            if !made_progress {
                break;
            }
        }

        let stuck: Vec<String> = (0..n)
            .filter(|&i| level[i].is_none())
            .map(|i| self.blocks[i].name().to_string())
            .collect();
        if !stuck.is_empty() {
            return Err(SimError::CombinationalLoop { blocks: stuck });
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| (level[i], i));
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CombContext;
    use crate::signal::SignalId;

    /// y = x + 1 on words
    struct Inc {
        name: String,
        x: Signal<u64>,
        y: Signal<u64>,
    }

    impl Combinational for Inc {
        fn name(&self) -> &str {
            &self.name
        }

        fn inputs(&self) -> Vec<SignalId> {
            vec![self.x.id()]
        }

        fn outputs(&self) -> Vec<SignalId> {
            vec![self.y.id()]
        }

        fn evaluate(&mut self, ctx: &mut CombContext<'_>) -> Result<()> {
            let x = ctx.get(self.x)?;
            ctx.drive(self.y, x.wrapping_add(1))
        }
    }

    fn inc(name: &str, x: Signal<u64>, y: Signal<u64>) -> Inc {
        Inc {
            name: name.to_string(),
            x,
            y,
        }
    }

    #[test]
    fn test_blocks_sorted_by_dependency() {
        let mut net = Netlist::new();
        let a = net.signal("a", 0u64);
        let b = net.signal("b", 0u64);
        let c = net.signal("c", 0u64);
        // Added downstream-first
        net.add_block(inc("second", b, c));
        net.add_block(inc("first", a, b));

        let deps = vec![HashSet::from([1]), HashSet::new()];
        assert_eq!(net.topological_order(&deps).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut net = Netlist::new();
        let a = net.signal("a", 0u64);
        let b = net.signal("b", 0u64);
        net.add_block(inc("fwd", a, b));
        net.add_block(inc("back", b, a));

        match net.build() {
            Err(SimError::CombinationalLoop { blocks }) => {
                assert_eq!(blocks, vec!["fwd".to_string(), "back".to_string()]);
            }
            other => panic!("expected loop error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut net = Netlist::new();
        let a = net.signal("a", 0u64);
        net.add_block(inc("self", a, a));
        assert!(matches!(
            net.build(),
            Err(SimError::CombinationalLoop { .. })
        ));
    }

    #[test]
    fn test_two_drivers_rejected() {
        let mut net = Netlist::new();
        let a = net.signal("a", 0u64);
        let b = net.signal("b", 0u64);
        let y = net.signal("y", 0u64);
        net.add_block(inc("one", a, y));
        net.add_block(inc("two", b, y));

        match net.build() {
            Err(SimError::MultipleDrivers {
                signal,
                first,
                second,
            }) => {
                assert_eq!(signal, "y");
                assert_eq!(first, "one");
                assert_eq!(second, "two");
            }
            other => panic!("expected driver error, got {:?}", other.err()),
        }
    }
}
