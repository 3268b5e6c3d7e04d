pub mod composer;
pub mod job_store;
pub mod media;
pub mod notification;
pub mod pipeline;
pub mod queue;
pub mod script;
pub mod slides;
pub mod speech;
pub mod storage;
pub mod worker;
