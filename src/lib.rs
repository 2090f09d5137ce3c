// ABOUTME: Root library module exposing all public modules
// ABOUTME: Gateway session, module registry, dispatch, and store lifecycle

pub mod backoff;
pub mod commands;
pub mod config;
pub mod context;
pub mod cooldown;
pub mod executor;
pub mod gateway;
pub mod metrics;
pub mod modules;
pub mod permissions;
pub mod registry;
pub mod router;
pub mod session;
pub mod status;
pub mod store;
