//! Domain model: campaigns, donations, donors, the events they raise, and the
//! storage ports the rest of the crate is written against.

pub mod campaign;
pub mod donation;
pub mod events;
pub mod money;
pub mod ports;
pub mod user;
