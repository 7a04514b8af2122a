//! AML risk scoring and case lifecycle engine.

pub mod aggregator;
pub mod alert;
pub mod alert_manager;
pub mod anomaly;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ml;
pub mod profile;
pub mod regulator;
pub mod report;
pub mod report_workflow;
pub mod risk_factors;
pub mod rng;
pub mod screening;
pub mod store;
pub mod types;

pub use engine::{AmlEngine, Assessment, EngineBuilder};
pub use error::{AmlError, AmlResult};
