//! Deterministic port allocation for step services.
//!
//! Every service name hashes to a preferred port inside the configured range,
//! so a name usually lands on the same port across restarts. Collisions fall
//! back to a few rehashed candidates and finally a linear scan.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::PortRange;
use crate::types::SupervisorError;

/// Rehashed candidates tried before scanning the whole range.
const COLLISION_PROBES: u32 = 8;

/// 32-bit string hash over UTF-16 code units (`h = h * 31 + c`, wrapping).
pub fn string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// The port a name prefers before any collision handling.
pub fn base_port(name: &str, range: PortRange) -> u16 {
    let offset = i64::from(string_hash(name)).abs() % i64::from(range.size.max(1));
    // offset < size, and base + size fits in u16 for a validated range.
    range.base.saturating_add(offset as u16)
}

#[derive(Debug, Default)]
struct PortTable {
    by_name: HashMap<String, u16>,
    by_port: HashMap<u16, String>,
}

impl PortTable {
    fn assign(&mut self, name: &str, port: u16) {
        self.by_name.insert(name.to_string(), port);
        self.by_port.insert(port, name.to_string());
    }
}

/// Maps service names to unique ports within one range.
#[derive(Debug)]
pub struct PortAllocator {
    range: PortRange,
    table: Mutex<PortTable>,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            table: Mutex::new(PortTable::default()),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Returns the port for `name`, assigning one if it has none.
    ///
    /// # Errors
    /// `PortRangeExhausted` when every port in the range is taken.
    pub fn allocate(&self, name: &str) -> Result<u16, SupervisorError> {
        let mut table = self.lock();
        if let Some(port) = table.by_name.get(name) {
            return Ok(*port);
        }

        let preferred = base_port(name, self.range);
        if !table.by_port.contains_key(&preferred) {
            table.assign(name, preferred);
            debug!(service = %name, port = preferred, "allocated port");
            return Ok(preferred);
        }

        for attempt in 1..=COLLISION_PROBES {
            let candidate = base_port(&format!("{name}#{attempt}"), self.range);
            if !table.by_port.contains_key(&candidate) {
                table.assign(name, candidate);
                debug!(service = %name, port = candidate, attempt, "allocated port after collision");
                return Ok(candidate);
            }
        }

        let free = (u32::from(self.range.base)..self.range.end())
            .filter_map(|port| u16::try_from(port).ok())
            .find(|port| !table.by_port.contains_key(port));
        match free {
            Some(port) => {
                table.assign(name, port);
                debug!(service = %name, port, "allocated port by linear scan");
                Ok(port)
            }
            None => {
                warn!(service = %name, in_use = table.by_port.len(), "port range exhausted");
                Err(SupervisorError::PortRangeExhausted {
                    in_use: table.by_port.len(),
                    size: self.range.size,
                })
            }
        }
    }

    /// Frees the port held by `name`. Returns the released port, if any.
    pub fn release(&self, name: &str) -> Option<u16> {
        let mut table = self.lock();
        let port = table.by_name.remove(name)?;
        table.by_port.remove(&port);
        debug!(service = %name, port, "released port");
        Some(port)
    }

    pub fn port_of(&self, name: &str) -> Option<u16> {
        self.lock().by_name.get(name).copied()
    }

    /// Drops every allocation.
    pub fn clear(&self) {
        let mut table = self.lock();
        table.by_name.clear();
        table.by_port.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A poisoned table is still consistent: every mutation is a pair of
    // inserts or removes with nothing in between that can panic.
    fn lock(&self) -> MutexGuard<'_, PortTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(PortRange::default())
    }
}
