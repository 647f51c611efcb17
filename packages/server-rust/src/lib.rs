//! MEP server: MP1 service registration and discovery.
//!
//! Requests enter through [`network`], become typed operations in
//! [`service`], and run as task pipelines from [`mp1`] against the
//! [`store`] adapters. [`codec`] maps service descriptions to registry
//! instances and publishes gateway routes through [`extif`].

pub mod appconf;
pub mod codec;
pub mod extif;
pub mod mp1;
pub mod network;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod tls;
