//! Command-line arguments for the two binaries.

mod args;

pub use args::{MountArgs, ServeArgs};
