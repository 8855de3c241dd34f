fn main() -> Result<(), Box<dyn std::error::Error>> {
    // One opaque envelope RPC, described by hand.
    let ring_node = tonic_build::manual::Service::builder()
        .name("RingNode")
        .package("chordring")
        .method(
            tonic_build::manual::Method::builder()
                .name("invoke")
                .route_name("Invoke")
                .input_type("crate::network::messages::envelope::RpcRequest")
                .output_type("crate::network::messages::envelope::RpcReply")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .build();

    tonic_build::manual::Builder::new().compile(&[ring_node]);
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
