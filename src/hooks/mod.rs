//! React-style hooks: memoized values, change-detection effects, and
//! throttled observable state.

mod effect;
mod memo;
mod registry;
mod state;

pub use effect::Effect;
pub use memo::MemoizedValue;
pub use registry::Hooks;
pub use state::{State, StateManager};
