pub mod controller;
pub mod haptics;
pub mod select;
