pub mod job;
pub mod status;
pub mod webhook;
