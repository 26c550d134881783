//! mame2mra, a converter from MAME machine listings to MiSTer ROM descriptors.
//!
//! The pipeline reads a `mame -listxml` dump into [`Machine`]s, then compiles
//! each machine into an MRA document: a ROM layout, an optional header with a
//! region offset table, DIP switch bit ranges and button names.
//!
//! [`Machine`]: mame/struct.Machine.html

#![deny(missing_docs)]
#![deny(unused)]
#![deny(warnings)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod int;
pub mod mame;
pub mod mra;
