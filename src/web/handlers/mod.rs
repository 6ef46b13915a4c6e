//! # Web API Handlers

pub mod diagnostics;
