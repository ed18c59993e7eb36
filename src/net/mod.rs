//! Thin network collaborators the checker environment hands to checker code

pub mod http;
pub mod tcp;
pub mod useragents;

pub use http::{expect_success, HttpClient};
pub use tcp::TcpConn;
pub use useragents::random_useragent;
