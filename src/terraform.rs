mod state;

pub use state::{STATE_VERSION, StateError, StateFile, StateResource};
