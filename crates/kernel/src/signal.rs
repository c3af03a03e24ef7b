//! Signals and the signal store

use std::fmt;
use std::marker::PhantomData;

use sgnsim_fixed_point::{EmbeddingVector, Fixed};

use crate::error::{Result, SimError};
use crate::wait::Edge;

/// Dynamically typed signal value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bit(bool),
    Word(u64),
    Fixed(Fixed),
    Vector(EmbeddingVector),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bit(_) => <bool as SignalValue>::KIND,
            Value::Word(_) => <u64 as SignalValue>::KIND,
            Value::Fixed(_) => <Fixed as SignalValue>::KIND,
            Value::Vector(_) => <EmbeddingVector as SignalValue>::KIND,
        }
    }
}

/// Types that can be carried on a [`Signal`]
pub trait SignalValue: Clone + PartialEq + fmt::Debug + 'static {
    const KIND: &'static str;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

impl SignalValue for bool {
    const KIND: &'static str = "bit";

    fn into_value(self) -> Value {
        Value::Bit(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bit(b) => Some(*b),
            _ => None,
        }
    }
}

impl SignalValue for u64 {
    const KIND: &'static str = "word";

    fn into_value(self) -> Value {
        Value::Word(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Word(w) => Some(*w),
            _ => None,
        }
    }
}

impl SignalValue for Fixed {
    const KIND: &'static str = "fixed";

    fn into_value(self) -> Value {
        Value::Fixed(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Fixed(f) => Some(*f),
            _ => None,
        }
    }
}

impl SignalValue for EmbeddingVector {
    const KIND: &'static str = "vector";

    fn into_value(self) -> Value {
        Value::Vector(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vector(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Untyped signal index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub(crate) usize);

impl SignalId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Typed handle to a signal in a [`crate::Netlist`] / [`crate::Simulation`]
pub struct Signal<T> {
    id: SignalId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Signal<T> {
    pub(crate) fn new(id: SignalId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({})", self.id.0)
    }
}

/// A committed value transition
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub signal: SignalId,
    pub old: Value,
    pub new: Value,
}

impl Change {
    /// Edge direction for bit signals
    pub fn edge(&self) -> Option<Edge> {
        match (&self.old, &self.new) {
            (Value::Bit(false), Value::Bit(true)) => Some(Edge::Rising),
            (Value::Bit(true), Value::Bit(false)) => Some(Edge::Falling),
            _ => None,
        }
    }
}

/// Who may write a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Driver {
    /// Written by tasks through `next`
    Tasks,
    /// Output of the combinational block with this index
    Block(usize),
}

#[derive(Debug)]
struct Slot {
    name: String,
    current: Value,
    next: Option<Value>,
    driver: Driver,
}

/// Current/next storage for every signal in a design
#[derive(Debug, Default)]
pub(crate) struct SignalStore {
    slots: Vec<Slot>,
    pending: Vec<SignalId>,
}

impl SignalStore {
    pub fn add<T: SignalValue>(&mut self, name: String, init: T) -> Signal<T> {
        let id = SignalId(self.slots.len());
        self.slots.push(Slot {
            name,
            current: init.into_value(),
            next: None,
            driver: Driver::Tasks,
        });
        Signal::new(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, id: SignalId) -> Result<&Slot> {
        self.slots.get(id.0).ok_or(SimError::UnknownSignal(id.0))
    }

    fn slot_mut(&mut self, id: SignalId) -> Result<&mut Slot> {
        self.slots.get_mut(id.0).ok_or(SimError::UnknownSignal(id.0))
    }

    pub fn name(&self, id: SignalId) -> &str {
        self.slots.get(id.0).map(|s| s.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn value(&self, id: SignalId) -> Result<&Value> {
        Ok(&self.slot(id)?.current)
    }

    pub fn driver(&self, id: SignalId) -> Result<Driver> {
        Ok(self.slot(id)?.driver)
    }

    pub fn set_driver(&mut self, id: SignalId, driver: Driver) -> Result<()> {
        self.slot_mut(id)?.driver = driver;
        Ok(())
    }

    /// Read the current value
    pub fn get<T: SignalValue>(&self, signal: Signal<T>) -> Result<T> {
        let slot = self.slot(signal.id())?;
        T::from_value(&slot.current).ok_or_else(|| SimError::TypeMismatch {
            signal: slot.name.clone(),
            expected: T::KIND,
            found: slot.current.kind(),
        })
    }

    fn check_kind(slot: &Slot, value: &Value) -> Result<()> {
        if std::mem::discriminant(&slot.current) != std::mem::discriminant(value) {
            return Err(SimError::TypeMismatch {
                signal: slot.name.clone(),
                expected: slot.current.kind(),
                found: value.kind(),
            });
        }
        Ok(())
    }

    /// Schedule a next value, committed at the following delta cycle
    pub fn schedule(&mut self, id: SignalId, value: Value) -> Result<()> {
        let slot = self.slot_mut(id)?;
        Self::check_kind(slot, &value)?;
        if slot.next.replace(value).is_none() {
            self.pending.push(id);
        }
        Ok(())
    }

    /// Overwrite the current value immediately (combinational outputs)
    pub fn drive_now(&mut self, id: SignalId, value: Value) -> Result<Option<Change>> {
        let slot = self.slot_mut(id)?;
        Self::check_kind(slot, &value)?;
        if slot.current == value {
            return Ok(None);
        }
        let old = std::mem::replace(&mut slot.current, value.clone());
        Ok(Some(Change {
            signal: id,
            old,
            new: value,
        }))
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Apply every scheduled `next -> current` transition
    pub fn commit(&mut self) -> Vec<Change> {
        let pending = std::mem::take(&mut self.pending);
        let mut changes = Vec::with_capacity(pending.len());
        for id in pending {
            let slot = &mut self.slots[id.0];
            let Some(next) = slot.next.take() else {
                continue;
            };
            if slot.current != next {
                let old = std::mem::replace(&mut slot.current, next.clone());
                changes.push(Change {
                    signal: id,
                    old,
                    new: next,
                });
            }
        }
        changes
    }
}
