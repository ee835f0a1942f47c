//! Control actions, update opcodes and update modes.
//!
//! These are the decoded forms of the packed opcode/control byte carried by
//! the wire format; the bit layout itself lives in [`crate::wire`].

use std::fmt;

/// What the appliance does with traffic to a blocked domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ControlAction {
    /// Drop the traffic silently
    #[default]
    Drop = 0,
    /// Redirect to a configured address
    Redirect = 1,
    /// Answer with deceptive content
    Deceive = 2,
}

impl ControlAction {
    /// Convert from a u8 value.
    ///
    /// Returns `None` for invalid values.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ControlAction::Drop),
            1 => Some(ControlAction::Redirect),
            2 => Some(ControlAction::Deceive),
            _ => None,
        }
    }

    /// Convert to a u8 value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Drop => "DROP",
            ControlAction::Redirect => "REDIRECT",
            ControlAction::Deceive => "DECEIVE",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ControlAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DROP" => Ok(ControlAction::Drop),
            "REDIRECT" => Ok(ControlAction::Redirect),
            "DECEIVE" => Ok(ControlAction::Deceive),
            _ => Err(()),
        }
    }
}

/// Whether an update record adds or removes a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Add (or replace) an entry
    Add = 0,
    /// Delete an entry
    Delete = 1,
}

impl Opcode {
    /// Convert from a u8 value.
    ///
    /// Returns `None` for invalid values.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Opcode::Add),
            1 => Some(Opcode::Delete),
            _ => None,
        }
    }

    /// Convert to a u8 value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Add => write!(f, "ADD"),
            Opcode::Delete => write!(f, "DELETE"),
        }
    }
}

/// How a batch of updates is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    /// Apply each record directly to the owning B-tree.
    Normal,
    /// Buffer records in the write cache; they reach the trees on the
    /// next drain.
    Quick,
}
