pub mod gain;
pub mod passthrough;
