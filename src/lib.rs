// Loading
mod image;
pub use image::Image;

// Running
mod runtime;
pub use runtime::RunState;
mod tty;
pub use tty::{Buffered, Stdio, Tty};

mod error;
mod ops;
