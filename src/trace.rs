//! Recording of physical-store primitive calls.

use crate::constants::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmEvent {
    Read { address: u64 },
    Write { address: u64, value: Word },
    Evict { frame: u64, page: u64 },
    Restore { frame: u64, page: u64 },
}

impl std::fmt::Display for PmEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PmEvent::Read { address } => write!(f, "PMread({})", address),
            PmEvent::Write { address, value } => write!(f, "PMwrite({}, {})", address, value),
            PmEvent::Evict { frame, page } => write!(f, "PMevict({}, {})", frame, page),
            PmEvent::Restore { frame, page } => write!(f, "PMrestore({}, {})", frame, page),
        }
    }
}

/// Ordered log of primitive calls
#[derive(Debug, Default, Clone)]
pub struct Trace {
    events: Vec<PmEvent>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: PmEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[PmEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether `expected` occur in this order, not necessarily adjacent.
    pub fn contains_in_order(&self, expected: &[PmEvent]) -> bool {
        let mut remaining = expected.iter().peekable();
        for event in &self.events {
            if remaining.peek() == Some(&event) {
                remaining.next();
            }
        }
        remaining.peek().is_none()
    }
}

impl std::fmt::Display for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for event in &self.events {
            writeln!(f, "{}", event)?;
        }
        Ok(())
    }
}
