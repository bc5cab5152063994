//! Domain models for the inventory accounting core

mod balance;
mod count;
mod order;
mod transaction;

pub use balance::*;
pub use count::*;
pub use order::*;
pub use transaction::*;
