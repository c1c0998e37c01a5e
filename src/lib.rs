/// Find Connections
///
/// Finds how two people are linked through photographs they appear in
/// together: shortest paths over a person graph, image uploads awaiting
/// review, user accounts and an admin curation surface.
pub mod account;
pub mod api;
pub mod auth;
pub mod ban;
pub mod config;
pub mod connections;
pub mod context;
pub mod db;
pub mod error;
pub mod graph;
pub mod mailer;
pub mod metrics;
pub mod object_store;
pub mod rate_limit;
pub mod server;
pub mod suggestions;
pub mod uploads;
pub mod validation;

#[cfg(test)]
mod test_support;
