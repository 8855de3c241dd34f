pub mod client;
pub mod server;
pub mod thread;

/// Service stubs generated by `build.rs`.
pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/chordring.RingNode.rs"));
}
