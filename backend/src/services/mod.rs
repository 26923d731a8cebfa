pub mod cancel;
pub mod collection;
pub mod collector_job;
pub mod locks;
pub mod normalizer;
pub mod pipeline;
pub mod quota;
pub mod roster;
pub mod sheet_store;
pub mod stages;
pub mod youtube;
