//! Observability utilities (metrics definitions).

pub mod metrics;
