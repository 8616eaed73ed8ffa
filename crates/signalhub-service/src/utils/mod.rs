pub mod futures;
pub mod http;
