//! Canva brand-template autofill
//!
//! Submits autofill jobs, polls them to completion within a fixed budget,
//! and hands finished thumbnails to an optional uploader.
//!
//! Generation lifecycle:
//! 1. `Poller::submit()` creates the job → `in_progress`
//! 2. `Poller::await_completion()` checks status every interval
//! 3. Terminal `success` / `failed`, or `timeout` once the budget is spent
//! 4. `Generator` uploads the thumbnail on success; upload errors only warn

pub mod api;
pub mod error;
pub mod generator;
pub mod poller;

pub use api::{AutofillApi, AutofillClient, Job};
pub use error::{Error, Result};
pub use generator::{GenerationReport, GenerationRequest, Generator};
pub use poller::{DesignOutput, JobReport, JobStatus, PollConfig, Poller};
