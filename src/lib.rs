//! runbox: a multi-tenant code execution service.
//!
//! Users create editing sessions bound to a language, mutate source text and
//! submit asynchronous run requests. Admission turns a request into a durable
//! QUEUED row plus a queued job; a worker pool reserves jobs, drives child
//! processes under wall-clock and output bounds, and records outcomes that
//! clients observe by polling.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod queue;
pub mod repository;
pub mod runner;
pub mod safety;
pub mod services;
pub mod worker;
