//! Simulated memory bank
//!
//! A clocked key-value store with one read port and one write port. Each port
//! has a strobe that the requester raises and the bank clears on the rising
//! clock edge that serves it, so the requester can wait on the strobe's
//! falling edge.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sgnsim_fixed_point::{Fixed, FixedFormat};
use sgnsim_kernel::{Netlist, Process, Resume, Result, Signal, TaskContext, Wait};
use tracing::debug;

/// Backing storage of a memory bank
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    cells: HashMap<u64, Fixed>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value at `addr`, or `default` if the address was never written
    pub fn read(&self, addr: u64, default: Fixed) -> Fixed {
        self.cells.get(&addr).copied().unwrap_or(default)
    }

    pub fn write(&mut self, addr: u64, value: Fixed) {
        self.cells.insert(addr, value);
    }

    pub fn get(&self, addr: u64) -> Option<Fixed> {
        self.cells.get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Storage handle shared between a bank and whoever inspects it after a run
pub type SharedStore = Rc<RefCell<MemoryStore>>;

/// Signals of one memory bank
#[derive(Debug, Clone, Copy)]
pub struct MemoryPorts {
    pub data_out: Signal<Fixed>,
    pub data_in: Signal<Fixed>,
    /// Value returned on a miss, sampled when the read is served
    pub default: Signal<Fixed>,
    pub read_addr: Signal<u64>,
    pub write_addr: Signal<u64>,
    /// Read strobe, cleared by the bank
    pub rd: Signal<bool>,
    /// Write strobe, cleared by the bank
    pub wr: Signal<bool>,
}

impl MemoryPorts {
    /// Declare the port signals of a bank named `prefix`
    pub fn declare(net: &mut Netlist, prefix: &str, format: FixedFormat, default: Fixed) -> Self {
        let zero = Fixed::zero(format);
        Self {
            data_out: net.signal(format!("{}.dout", prefix), zero),
            data_in: net.signal(format!("{}.din", prefix), zero),
            default: net.signal(format!("{}.default", prefix), default.requantize(format)),
            read_addr: net.signal(format!("{}.raddr", prefix), 0u64),
            write_addr: net.signal(format!("{}.waddr", prefix), 0u64),
            rd: net.signal(format!("{}.rd", prefix), false),
            wr: net.signal(format!("{}.wr", prefix), false),
        }
    }
}

/// Clocked memory bank process.
///
/// On every rising edge of `clk`: a pending write stores `data_in` at
/// `write_addr` and clears `wr`; then a pending read drives `data_out` with the
/// value at `read_addr` (or the live `default` on a miss) and clears `rd`.
pub struct MemoryBank {
    name: String,
    ports: MemoryPorts,
    clk: Signal<bool>,
    store: SharedStore,
}

impl MemoryBank {
    pub fn new(name: impl Into<String>, ports: MemoryPorts, clk: Signal<bool>) -> Self {
        Self::with_store(name, ports, clk, Rc::new(RefCell::new(MemoryStore::new())))
    }

    pub fn with_store(
        name: impl Into<String>,
        ports: MemoryPorts,
        clk: Signal<bool>,
        store: SharedStore,
    ) -> Self {
        Self {
            name: name.into(),
            ports,
            clk,
            store,
        }
    }

    pub fn store(&self) -> SharedStore {
        Rc::clone(&self.store)
    }

    fn serve(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let p = self.ports;

        if ctx.get(p.wr)? {
            let addr = ctx.get(p.write_addr)?;
            let value = ctx.get(p.data_in)?;
            self.store.borrow_mut().write(addr, value);
            ctx.set(p.wr, false)?;
            debug!(bank = %self.name, time = ctx.now(), addr, value = %value, "write");
        }

        if ctx.get(p.rd)? {
            let addr = ctx.get(p.read_addr)?;
            let default = ctx.get(p.default)?;
            let value = self.store.borrow().read(addr, default);
            ctx.set(p.data_out, value)?;
            ctx.set(p.rd, false)?;
            debug!(bank = %self.name, time = ctx.now(), addr, value = %value, "read");
        }

        Ok(())
    }
}

impl Process for MemoryBank {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
        if reason != Resume::Start {
            self.serve(ctx)?;
        }
        Ok(Wait::rising(self.clk))
    }
}
