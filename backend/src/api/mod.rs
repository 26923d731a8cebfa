mod channels;
mod collect;
mod quota;
mod scheduler;

pub use channels::*;
pub use collect::*;
pub use quota::*;
pub use scheduler::*;

use crate::error::CollectorError;
use rocket::http::Status;
use rocket::{routes, Route};

pub fn collect_routes() -> Vec<Route> {
    routes![run_collection]
}

pub fn channel_routes() -> Vec<Route> {
    routes![get_channels, add_channel, remove_channel, get_channel_history]
}

pub fn quota_routes() -> Vec<Route> {
    routes![get_quota, reset_quota]
}

pub fn scheduler_routes() -> Vec<Route> {
    routes![start_job, stop_job, run_job, job_status]
}

fn error_status(e: &CollectorError) -> Status {
    match e {
        CollectorError::InvalidRequest(_) => Status::BadRequest,
        e if e.is_transient() => Status::BadGateway,
        _ => Status::InternalServerError,
    }
}
