//! Gemini CLI process spawning and stream supervision.

mod events;
mod process;
mod reader;
mod state;
mod stream;

pub use events::*;
pub use process::*;
pub use reader::*;
pub use state::*;
pub use stream::*;
