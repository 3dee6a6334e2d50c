//! Core of the gateway: capability contracts, value objects, the
//! provider registry and factory, the provider implementations, and the
//! Supabase client.

pub mod capability;
pub mod error;
pub mod factory;
pub mod models;
pub mod providers;
pub mod registry;
pub mod services;
pub mod supabase;
