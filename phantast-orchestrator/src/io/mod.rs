//! I/O collaborators of a batch job
//!
//! Where images come from and where rendered results go.

pub mod input;
pub mod output;

pub use input::{FsInputSource, InputEnumerationError, InputSource};
pub use output::{FileOutputWriter, OutputError, OutputRequest, OutputWriter, output_names};
