//! Core runtime module
//!
//! The scene instance, the clock, the phase-ordered scheduler, and the
//! coroutine engine.

mod coroutine;
mod scene;
mod scheduler;
mod time;

pub use coroutine::{Sequence, Step, Wait};
pub use scene::{ConfigError, Scene, SceneConfig};
pub use time::Time;
