//! courier-routing core
//!
//! Delivery sequencing (TSP) and capacitated multi-courier routing (CVRP)
//! over road distance matrices, with a two-layer temporal cache in front of
//! the remote distance oracle.

pub mod error;
pub mod coordinate;
pub mod traits;
pub mod haversine;
pub mod time_bucket;
pub mod store;
pub mod redis_store;
pub mod cache;
pub mod oracle;
pub mod matrix;
pub mod cost;
pub mod solver;
pub mod route_solver;
pub mod balance;
pub mod profiler;
pub mod config;
pub mod optimizer;
