#![cfg_attr(not(feature = "std"), no_std)]
extern crate alloc;

pub mod clock;

pub mod hash;

pub mod name;

pub mod content;

pub mod interest;

pub mod profiles;

pub mod table;

pub mod transport;

pub mod flow;

pub mod error;

pub mod platform;

#[cfg(feature = "std")]
pub mod reader;

#[cfg(all(feature = "std", feature = "sha2"))]
pub mod writer;

pub use error::Error;
