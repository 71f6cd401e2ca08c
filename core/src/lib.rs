#![doc = include_str!("../../README.md")]
#![forbid(missing_docs)]

pub mod bus;
pub mod decode;
pub mod engine;
pub mod io;
pub mod machine;
pub mod memory;
pub mod microcode;
pub mod panel;
pub mod registers;
pub mod snapshot;
pub mod timing;
