pub mod api;
pub mod enrich;
pub mod http;
pub mod model;
