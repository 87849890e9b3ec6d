//! Packet stream filtering: predicates, magazine tracking, squash voting.

pub mod magazine;
pub mod passthrough;
pub mod squash;

pub use magazine::{MagazineState, MagazineTracker, PageKey};
pub use passthrough::{PassFilter, Predicate};
pub use squash::{SquashConfig, SquashFilter};
