//! Scheduler behaviour through the public wiring API

use std::cell::RefCell;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sgnsim_kernel::{
    ClockGenerator, CombContext, Combinational, Netlist, Process, Result, Resume, RunOutcome,
    Signal, SignalId, SimError, TaskContext, Trigger, Wait,
};

type Log = Rc<RefCell<Vec<(u64, String)>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

// =============================================================================
// Helpers
// =============================================================================

/// Raises two strobes at time 0, then joins on both falling edges
struct JoinWaiter {
    a: Signal<bool>,
    b: Signal<bool>,
    log: Log,
}

impl Process for JoinWaiter {
    fn name(&self) -> &str {
        "join_waiter"
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
        match reason {
            Resume::Start => {
                ctx.set(self.a, true)?;
                ctx.set(self.b, true)?;
                Ok(Wait::join([
                    Trigger::falling(self.a),
                    Trigger::falling(self.b),
                ]))
            }
            other => {
                self.log
                    .borrow_mut()
                    .push((ctx.now(), format!("{:?}", other)));
                Ok(Wait::Done)
            }
        }
    }
}

/// Clears a strobe `delay` units after seeing it rise
struct Clearer {
    name: String,
    strobe: Signal<bool>,
    delay: u64,
    step: u8,
}

impl Clearer {
    fn new(name: &str, strobe: Signal<bool>, delay: u64) -> Self {
        Self {
            name: name.to_string(),
            strobe,
            delay,
            step: 0,
        }
    }
}

impl Process for Clearer {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, _reason: Resume) -> Result<Wait> {
        self.step += 1;
        match self.step {
            1 => Ok(Wait::rising(self.strobe)),
            2 => Ok(Wait::delay(self.delay)),
            _ => {
                ctx.set(self.strobe, false)?;
                Ok(Wait::Done)
            }
        }
    }
}

/// y = x + 1
struct Increment {
    x: Signal<u64>,
    y: Signal<u64>,
}

impl Combinational for Increment {
    fn name(&self) -> &str {
        "increment"
    }

    fn inputs(&self) -> Vec<SignalId> {
        vec![self.x.id()]
    }

    fn outputs(&self) -> Vec<SignalId> {
        vec![self.y.id()]
    }

    fn evaluate(&mut self, ctx: &mut CombContext<'_>) -> Result<()> {
        let x = ctx.get(self.x)?;
        ctx.drive(self.y, x + 1)
    }
}

fn join_design(delay_a: u64, delay_b: u64) -> (sgnsim_kernel::Simulation, Log) {
    let log = new_log();
    let mut net = Netlist::new();
    let a = net.signal("a", false);
    let b = net.signal("b", false);
    net.spawn(JoinWaiter {
        a,
        b,
        log: log.clone(),
    });
    net.spawn(Clearer::new("clear_a", a, delay_a));
    net.spawn(Clearer::new("clear_b", b, delay_b));
    (net.build().unwrap(), log)
}

// =============================================================================
// Join
// =============================================================================

#[test]
fn test_join_resumes_once_on_simultaneous_edges() {
    let (mut sim, log) = join_design(10, 10);
    assert_eq!(sim.run().unwrap(), RunOutcome::Idle { time: 10 });

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], (10, "Joined".to_string()));
}

#[test]
fn test_join_resumes_on_later_edge() {
    for (da, db) in [(10, 25), (25, 10)] {
        let (mut sim, log) = join_design(da, db);
        sim.run().unwrap();

        let log = log.borrow();
        assert_eq!(log.len(), 1, "join resumed more than once for {:?}", (da, db));
        assert_eq!(log[0].0, 25);
    }
}

// =============================================================================
// Combinational settle
// =============================================================================

/// Writes x, then checks the block output once x has committed
struct Prober {
    x: Signal<u64>,
    y: Signal<u64>,
    seen: Rc<RefCell<Vec<(u64, u64)>>>,
    remaining: u64,
}

impl Process for Prober {
    fn name(&self) -> &str {
        "prober"
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
        if reason != Resume::Start {
            self.seen
                .borrow_mut()
                .push((ctx.get(self.x)?, ctx.get(self.y)?));
        }
        if self.remaining == 0 {
            return Ok(Wait::Done);
        }
        self.remaining -= 1;
        let x = ctx.get(self.x)?;
        ctx.set(self.x, x + 10)?;
        Ok(Wait::changed(self.x))
    }
}

#[test]
fn test_blocks_settle_before_tasks_resume() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut net = Netlist::new();
    let x = net.signal("x", 0u64);
    let y = net.signal("y", 0u64);
    net.add_block(Increment { x, y });
    net.spawn(Prober {
        x,
        y,
        seen: seen.clone(),
        remaining: 3,
    });
    let mut sim = net.build().unwrap();

    // Initial settle happens before any task runs
    sim.run().unwrap();
    assert_eq!(*seen.borrow(), vec![(10, 11), (20, 21), (30, 31)]);
    assert_eq!(sim.peek(y).unwrap(), 31);
}

struct Rogue {
    y: Signal<u64>,
}

impl Process for Rogue {
    fn name(&self) -> &str {
        "rogue"
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, _reason: Resume) -> Result<Wait> {
        ctx.set(self.y, 5)?;
        Ok(Wait::Done)
    }
}

#[test]
fn test_task_cannot_drive_block_output() {
    let mut net = Netlist::new();
    let x = net.signal("x", 0u64);
    let y = net.signal("y", 0u64);
    net.add_block(Increment { x, y });
    net.spawn(Rogue { y });
    let mut sim = net.build().unwrap();

    match sim.run() {
        Err(SimError::DrivenByBlock { signal, block }) => {
            assert_eq!(signal, "y");
            assert_eq!(block, "increment");
        }
        other => panic!("expected driver error, got {:?}", other),
    }
}

// =============================================================================
// Level, clock edges and stop
// =============================================================================

struct LevelWaiter {
    flag: Signal<bool>,
    log: Log,
}

impl Process for LevelWaiter {
    fn name(&self) -> &str {
        "level_waiter"
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
        if reason == Resume::Start {
            return Ok(Wait::level(self.flag, false));
        }
        self.log
            .borrow_mut()
            .push((ctx.now(), format!("{:?}", reason)));
        Ok(Wait::Done)
    }
}

#[test]
fn test_level_already_satisfied_fires_immediately() {
    let log = new_log();
    let mut net = Netlist::new();
    let flag = net.signal("flag", false);
    net.spawn(LevelWaiter {
        flag,
        log: log.clone(),
    });
    let mut sim = net.build().unwrap();

    assert_eq!(sim.run().unwrap(), RunOutcome::Idle { time: 0 });
    assert_eq!(log.borrow().len(), 1);
    assert!(log.borrow()[0].1.starts_with("Fired(Level"));
}

/// Counts rising clock edges and stops after `limit`
struct EdgeCounter {
    clk: Signal<bool>,
    count: u64,
    limit: u64,
    log: Log,
}

impl Process for EdgeCounter {
    fn name(&self) -> &str {
        "edge_counter"
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
        if reason != Resume::Start {
            self.count += 1;
            self.log
                .borrow_mut()
                .push((ctx.now(), format!("edge {}", self.count)));
            if self.count == self.limit {
                ctx.stop();
            }
        }
        Ok(Wait::rising(self.clk))
    }
}

#[test]
fn test_stop_after_rising_edges() {
    let log = new_log();
    let mut net = Netlist::new();
    let clk = net.signal("clk", false);
    net.spawn(ClockGenerator::new(clk, 5).unwrap());
    net.spawn(EdgeCounter {
        clk,
        count: 0,
        limit: 3,
        log: log.clone(),
    });
    let mut sim = net.build().unwrap();

    assert_eq!(sim.run().unwrap(), RunOutcome::Stopped { time: 25 });
    let times: Vec<u64> = log.borrow().iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![5, 15, 25]);

    // Stop is terminal
    assert_eq!(sim.run().unwrap(), RunOutcome::Stopped { time: 25 });
    assert!(sim.is_stopped());
}

#[test]
fn test_edge_wait_on_word_signal_rejected() {
    struct BadEdge {
        word: Signal<u64>,
    }

    impl Process for BadEdge {
        fn name(&self) -> &str {
            "bad_edge"
        }

        fn resume(&mut self, _ctx: &mut TaskContext<'_>, _reason: Resume) -> Result<Wait> {
            Ok(Wait::On(Trigger::Edge {
                signal: self.word.id(),
                edge: sgnsim_kernel::Edge::Rising,
            }))
        }
    }

    let mut net = Netlist::new();
    let word = net.signal("word", 0u64);
    net.spawn(BadEdge { word });
    let mut sim = net.build().unwrap();
    assert!(matches!(sim.run(), Err(SimError::TypeMismatch { .. })));
}

// =============================================================================
// Determinism
// =============================================================================

/// Toggles its own signal after random delays drawn from a seeded RNG
struct RandomToggler {
    name: String,
    sig: Signal<bool>,
    rng: ChaCha20Rng,
    log: Log,
}

impl Process for RandomToggler {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
        if reason != Resume::Start {
            let v = ctx.get(self.sig)?;
            ctx.set(self.sig, !v)?;
            self.log
                .borrow_mut()
                .push((ctx.now(), format!("{} -> {}", self.name, !v)));
        }
        Ok(Wait::delay(self.rng.gen_range(1..8)))
    }
}

/// Joins on every toggler's signal changing
struct Watcher {
    sigs: Vec<Signal<bool>>,
    log: Log,
}

impl Process for Watcher {
    fn name(&self) -> &str {
        "watcher"
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
        if reason == Resume::Joined {
            self.log.borrow_mut().push((ctx.now(), "all changed".into()));
        }
        Ok(Wait::join(self.sigs.iter().map(|&s| Trigger::changed(s))))
    }
}

fn random_trace(seed: u64) -> Vec<(u64, String)> {
    let log = new_log();
    let mut net = Netlist::new();
    let mut sigs = Vec::new();
    for i in 0..4 {
        let sig = net.signal(format!("s{}", i), false);
        sigs.push(sig);
        net.spawn(RandomToggler {
            name: format!("toggler{}", i),
            sig,
            rng: ChaCha20Rng::seed_from_u64(seed + i),
            log: log.clone(),
        });
    }
    net.spawn(Watcher {
        sigs,
        log: log.clone(),
    });

    let mut sim = net.build().unwrap();
    assert!(matches!(
        sim.run_until(500).unwrap(),
        RunOutcome::TimeLimit { .. }
    ));
    let trace = log.borrow().clone();
    trace
}

#[test]
fn test_runs_are_deterministic() {
    let first = random_trace(42);
    let second = random_trace(42);
    assert!(!first.is_empty());
    assert!(first.iter().any(|(_, e)| e == "all changed"));
    assert_eq!(first, second);
    assert_ne!(first, random_trace(43));
}
