mod run;
mod status;

pub use run::{Run, RunId};
pub use status::{JobStatus, Transition};
