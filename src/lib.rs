//! Hybrid in-memory/on-disk tables of domain names mapped to 64-bit
//! category masks.
//!
//! A [`Table64`] keeps recently written entries resident and pages the rest
//! out to private on-disk runs once a size limit is reached. Lookups walk
//! the suffixes of a name, so `www.example.com` finds the value stored for
//! `example.com` when nothing closer exists.
mod cache;
mod disk;
pub mod domain;
mod domains;
mod error;
mod filter;
mod getter;
pub mod opt;
mod run;
mod storage;
mod table;
pub mod util;

pub use disk::{DiskRange, SENTINEL};
pub use domain::{drop_leftmost_label, encode, WordKey};
pub use error::{Error, IResult};
pub use getter::Getter;
pub use opt::{DuplicatePolicy, Options};
pub use table::Table64;
pub use util::reporter::{LogReporter, NoopReporter, Reporter};
