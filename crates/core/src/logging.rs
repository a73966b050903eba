//! Structured diagnostics for the memory subsystems.
//!
//! Every anomaly a subsystem tolerates (out-of-range accesses, inconsistent
//! cartridge headers, checksum mismatches) is reported here as a structured
//! entry and mirrored to the [`log`] facade, so a host can pick any backend
//! without the emulation core caring about transport.
//!
//! The collector is per-session state, shared between the devices of one
//! emulated machine via `Rc`; parallel sessions get independent collectors.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Severity of a diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Matching level on the `log` facade
    fn log_level(self) -> log::Level {
        match self {
            Severity::Trace => log::Level::Trace,
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warn => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

/// Subsystem a diagnostic originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Backing store (ROM/RAM) access
    Memory,
    /// Cartridge header parsing and runtime corrections
    Cartridge,
    /// Bus dispatch
    Bus,
    /// I/O port space
    Io,
    /// Interrupt forwarding
    Interrupts,
}

impl Category {
    /// Log target string for this category
    fn target(self) -> &'static str {
        match self {
            Category::Memory => "memory",
            Category::Cartridge => "cartridge",
            Category::Bus => "bus",
            Category::Io => "io",
            Category::Interrupts => "interrupts",
        }
    }
}

/// One recorded anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
}

/// Per-session diagnostic collector.
///
/// Interior mutability keeps the reporting call `&self`, so read paths that
/// only log (and never otherwise mutate) stay shared borrows.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry and mirror it to the `log` facade
    pub fn report(&self, category: Category, severity: Severity, message: String) {
        log::log!(target: category.target(), severity.log_level(), "{message}");
        self.entries.borrow_mut().push(Diagnostic {
            severity,
            category,
            message,
        });
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Number of entries recorded for one category
    pub fn count(&self, category: Category) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.category == category)
            .count()
    }

    /// Snapshot of all recorded entries
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    /// Highest severity recorded so far, if any
    pub fn worst(&self) -> Option<Severity> {
        self.entries.borrow().iter().map(|entry| entry.severity).max()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}
