//! Frame processor contract shared by pipeline stages.

pub mod frame;

pub use frame::*;
