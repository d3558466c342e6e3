pub mod thermal;

pub use thermal::ThermalDetector;
