//! Derivative-free optimizers
//!
//! - `brent`: bracketing and Brent line minimization
//! - `powell`: Powell's direction-set method built on `brent`

pub mod brent;
pub mod powell;

pub use brent::{bracket_minimum, brent_minimize, Bracket, LineMinimum};
pub use powell::{powell_minimize, PowellParams, PowellResult};
