//! Transparency module: auditable counts of what the capture pipeline did.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, Counter, SharedTransparencyLog,
    TransparencyLog, TransparencyStats,
};
