//! Infrastructure layer of the client.
//!
//! **Dependency rule**: this layer may depend on `application` and `ami_core`,
//! but MUST NOT be imported by the `application` or domain layers.
//!
//! - **`config`** – TOML configuration file and its mapping to engine options.
//! - **`network`** – TCP connector and tokio stream adapters for the
//!   transport traits.

pub mod config;
pub mod network;
