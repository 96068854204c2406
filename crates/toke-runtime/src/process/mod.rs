//! Child-process plumbing shared by every backend.

mod health;
mod shutdown;
mod spawn;

pub use health::{Readiness, ReadinessProbe, check_health, wait_until_ready};
pub use shutdown::{SHUTDOWN_GRACE, shutdown_child};
pub use spawn::{OutputStyle, ServerCommand};
