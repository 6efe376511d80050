pub mod ask;
mod log;

pub use log::*;
