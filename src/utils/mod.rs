pub mod black_scholes;
pub mod file_store;
mod plotting;
pub mod polars_utils;
pub mod probability;
pub mod time;

pub use file_store::{FileStore, Stage, StoreFormat};
pub use plotting::*;
pub use probability::*;
pub use time::*;
