pub mod answers;
pub mod questions;
pub mod timer;

pub use answers::*;
pub use questions::*;
pub use timer::*;
