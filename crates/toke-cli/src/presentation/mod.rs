//! Terminal output helpers shared by handlers.

mod progress;
mod tables;

pub use progress::{ByteBar, DependencyBars};
pub use tables::{print_separator, truncate_string};
