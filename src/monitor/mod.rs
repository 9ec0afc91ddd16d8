mod controller;

pub use controller::{MonitorController, MonitorIntervals};
