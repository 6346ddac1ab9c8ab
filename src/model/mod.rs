// src/model/mod.rs

//! Data carried through the launcher: job descriptions, bus messages and
//! submit-file value formatting.

pub mod job;
pub mod messages;
pub mod submitfile;

pub use job::{
    Container, ContainerImage, JobDescription, Step, StepComponent, StepConfig, StepInput,
    StepParam, Volume,
};
pub use messages::{JobRequest, JobState, Pong, StopRequest, UpdateMessage};
pub use submitfile::{condor_bytes, format_list};
