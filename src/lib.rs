//! Document OCR jobs: signed-URL uploads, asynchronous job polling, result
//! normalization across model output schemas, and overlay geometry.
//!
//! The server side (`routes`) fronts an object store and an async inference
//! endpoint. The client side (`services`) drives a job from upload to a
//! terminal state and turns its raw payload into renderable pages.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
