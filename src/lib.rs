// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Core of a columnar segment store.
//!
//! * [`index`]: the block index of a segment, cached and pinned by readers.
//! * [`chunk`]: column chunks and the readers of every format version.
//! * [`delete_delta`]: rows deleted from a block without rewriting it.
//! * [`lock`]: retrying locks guarding metadata mutation.

#![deny(unused_must_use)]

mod checksum;
pub mod chunk;
pub mod data_file;
pub mod delete_delta;
mod encode;
mod error;
pub mod footer;
pub mod fs;
pub mod index;
pub mod layout;
pub mod lock;
pub mod options;
pub mod proto;
pub mod scan;
pub mod segment_properties;

pub use self::error::*;
