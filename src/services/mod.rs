pub mod cache;
pub mod fetcher;
pub mod m3u_parser;
pub mod metrics;
pub mod users;
