pub(crate) mod gate;
mod machine;
mod state;
mod stream;
pub(crate) mod worker;

pub use gate::{OutputSink, PublishStats};
pub use machine::*;
pub use state::*;
pub use stream::*;
