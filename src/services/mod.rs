pub mod freshness;
pub mod passthrough;
