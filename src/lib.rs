//! Preboarding video service
//!
//! An HR system posts an onboarding webhook; the service records a job,
//! queues it, and background workers turn the employee's details into a
//! narrated welcome video: script, speech, slides, composition and an email
//! pointing at the result. Clients poll the job's status over HTTP.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod signal;
