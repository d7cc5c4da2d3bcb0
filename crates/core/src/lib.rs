#![forbid(unsafe_code)]

pub mod catalog;
pub mod model;
pub mod sequencer;
pub mod time;

pub use catalog::{CatalogError, CurriculumCatalog};
pub use time::Clock;
