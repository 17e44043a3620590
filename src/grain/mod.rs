//! Grain identity and the state an activation holds between storage calls.

pub mod id;
pub mod state;

pub use id::{GrainId, GrainIdError, GrainKey};
pub use state::GrainState;
