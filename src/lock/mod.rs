// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Mutual exclusion for metadata mutation.
//!
//! A backend provides a single-shot [`LockPrimitive`] for a (table, usage) pair.
//! [`RetryingLock`] turns it into a lock that retries a bounded number of times with a fixed
//! interval between attempts. Contention and cancellation are reported as `false`, never as
//! errors.

mod local;
mod memory;
mod retry;

use std::fmt;

pub use local::*;
pub use memory::*;
pub use retry::*;

use crate::options::LockOptions;

/// What a lock protects within a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockUsage {
    Metadata,
    Compaction,
    TableStatus,
    DeleteSegment,
    CleanFiles,
}

impl LockUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "meta",
            Self::Compaction => "compaction",
            Self::TableStatus => "tablestatus",
            Self::DeleteSegment => "delete_segment",
            Self::CleanFiles => "clean_files",
        }
    }
}

impl fmt::Display for LockUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a lock resource and how hard to try acquiring it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockDescriptor {
    pub table: String,
    pub usage: LockUsage,
    pub options: LockOptions,
}

impl LockDescriptor {
    pub fn new(table: impl Into<String>, usage: LockUsage, options: LockOptions) -> Self {
        Self {
            table: table.into(),
            usage,
            options,
        }
    }

    /// Key identifying the resource in a backend.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LockDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.usage)
    }
}

/// Exclusive resource that can be acquired once without waiting.
pub trait LockPrimitive: Send {
    /// Try to acquire the resource. Returns `false` if it is held by someone else or the
    /// backend failed.
    fn try_acquire_once(&mut self) -> bool;

    /// Release the resource. Does nothing if it is not held.
    fn release(&mut self);
}

impl<P: LockPrimitive + ?Sized> LockPrimitive for Box<P> {
    fn try_acquire_once(&mut self) -> bool {
        (**self).try_acquire_once()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
