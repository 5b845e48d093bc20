//! Worker loops: one generic claim/process/settle body shared by Stage A
//! and Stage B (spec §4.4).

pub mod spec;
pub mod worker_loop;

pub use spec::{StageSpec, STAGE_A, STAGE_B};
pub use worker_loop::run_worker;
