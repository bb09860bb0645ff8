use super::args::*;

mod dispatch;
mod dump;
mod restore;
mod stores;

pub use dispatch::dispatch;
