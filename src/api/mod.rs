//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value with optional TTL and namespace
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key from both tiers
//! - `DELETE /namespace/:ns` - Invalidate a namespace
//! - `POST /clear` - Empty the cache
//! - `POST /sweep` - Run an expiry sweep
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
