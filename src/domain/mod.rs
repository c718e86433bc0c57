// Domain layer: run data model and the ports implemented by adapters.

pub mod model;
pub mod ports;
