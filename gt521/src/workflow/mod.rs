//! Multi-step procedures built on top of [`Device`](crate::Device)

mod enroll;
mod identify;

pub use enroll::{EnrollFailure, EnrollState, Enrollment};
pub use identify::identify;
