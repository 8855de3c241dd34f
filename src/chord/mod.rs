pub mod descriptor;
pub mod node;
pub mod peer;
pub mod routing;
pub mod types;
pub mod workers;
