//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `GET /touch/:key` - Retrieve a value and reset its TTL
//! - `DELETE /del/:key` - Delete a key
//! - `GET /ttl/:key` - Remaining TTL of a key
//! - `GET /keys` - List live keys
//! - `DELETE /clear` - Remove every key
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
