//! # Pipeline Scenario Executor (L1/L2)
//!
//! Scenarios exercise the host service through its real request pipeline:
//! [`request`] declares what to send and expect, [`harness`] submits it
//! in-process, [`executor`] turns a scenario into a schedulable unit.

pub mod executor;
pub mod harness;
pub mod request;

pub use executor::{category_for_status, ScenarioUnit};
pub use harness::{PipelineError, PipelineResponse, RequestPipeline, RouterPipeline};
pub use request::{
    Capture, CarriedState, Expectation, FieldExpectation, FieldType, PipelineRequest,
    RequestTemplate, ScenarioStep, StatusExpectation,
};
