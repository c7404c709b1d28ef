pub mod job;
pub mod request_loop;
pub mod response;
