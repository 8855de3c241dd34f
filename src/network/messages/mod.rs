pub mod conversions;
pub mod envelope;
