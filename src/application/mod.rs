//! Application layer orchestrating the domain over the store ports.

pub mod service;
