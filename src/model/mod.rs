//! Input data model: the business record being submitted and the directory
//! target catalog.

mod business;
mod target;

pub use business::{Address, Business, BusinessRecord, Contact, Location};
pub use target::{Difficulty, DirectoryTarget, SelectorHint, TargetCatalog};

#[cfg(test)]
pub(crate) use business::sample_record;
