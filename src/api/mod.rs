pub mod health;
pub mod latency;
pub mod proxy;
pub mod routes;
