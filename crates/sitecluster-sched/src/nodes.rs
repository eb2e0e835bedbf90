//! Node enumeration for the running job's allocation.

use crate::error::{SchedError, SchedResult};

/// Hosts reserved for the current job, each with its slot count.
///
/// Sub-node launches address a flat, zero-based list in which every host
/// appears once per slot, in allocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAllocation {
    hosts: Vec<(String, usize)>,
}

impl NodeAllocation {
    /// Build from `(host, slots)` pairs.
    pub fn new(hosts: Vec<(String, usize)>) -> Self {
        Self { hosts }
    }

    /// Parse alternating `host slots host slots ...` words, as found in
    /// `LSB_MCPU_HOSTS`.
    pub fn from_host_slot_pairs(text: &str) -> SchedResult<Self> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut hosts = Vec::with_capacity(words.len() / 2);
        for pair in words.chunks(2) {
            match pair {
                [host, slots] => hosts.push((host.to_string(), parse_slots(slots, text)?)),
                _ => return Err(malformed(text)),
            }
        }
        Ok(Self { hosts })
    }

    /// Parse one host name per slot, as found in `LSB_HOSTS`. Repeated
    /// adjacent names are folded into one entry.
    pub fn from_slot_list(text: &str) -> Self {
        let mut hosts: Vec<(String, usize)> = Vec::new();
        for host in text.split_whitespace() {
            match hosts.last_mut() {
                Some((last, slots)) if last == host => *slots += 1,
                _ => hosts.push((host.to_string(), 1)),
            }
        }
        Self { hosts }
    }

    /// Parse an SGE `PE_HOSTFILE` body: one `host slots queue processors`
    /// line per host.
    pub fn from_pe_hostfile(text: &str) -> SchedResult<Self> {
        let mut hosts = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(host), Some(slots)) => {
                    hosts.push((host.to_string(), parse_slots(slots, line)?));
                }
                _ => return Err(malformed(line)),
            }
        }
        Ok(Self { hosts })
    }

    /// `(host, slots)` pairs in allocation order.
    pub fn hosts(&self) -> &[(String, usize)] {
        &self.hosts
    }

    /// Number of distinct hosts.
    pub fn host_count(&self) -> usize {
        let mut names: Vec<&str> = self.hosts.iter().map(|(h, _)| h.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }

    /// Number of addressable slots.
    pub fn slot_count(&self) -> usize {
        self.hosts.iter().map(|(_, slots)| slots).sum()
    }

    /// Host behind the slot at `index`.
    pub fn host_at(&self, index: usize) -> SchedResult<&str> {
        let mut remaining = index;
        for (host, slots) in &self.hosts {
            if remaining < *slots {
                return Ok(host);
            }
            remaining -= slots;
        }
        Err(SchedError::NodeOutOfRange {
            index,
            available: self.slot_count(),
        })
    }
}

/// Reject an index that falls outside `available` nodes.
pub fn check_index(index: usize, available: usize) -> SchedResult<()> {
    if index < available {
        Ok(())
    } else {
        Err(SchedError::NodeOutOfRange { index, available })
    }
}

fn parse_slots(word: &str, context: &str) -> SchedResult<usize> {
    word.parse().map_err(|_| malformed(context))
}

fn malformed(text: &str) -> SchedError {
    SchedError::InvalidEnv {
        var: "host allocation".to_string(),
        value: text.to_string(),
    }
}
