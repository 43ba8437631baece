//! Ambient credential providers for remote stores

pub mod gcp;

pub use gcp::GcpCredentials;
