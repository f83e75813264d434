use prost::Message as _;

/// Compiles the vendored proto tree with `protox` (a pure-Rust protoc) so the
/// build has no system `protoc` dependency, then hands the descriptor set to
/// `tonic-build`. The encoded descriptors are also written to `OUT_DIR` so
/// the server can register gRPC reflection from them.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protos = [
        "proto/google/rpc/status.proto",
        "proto/google/rpc/error_details.proto",
        "proto/google/longrunning/operations.proto",
        "proto/macosusesdk/v1/automation.proto",
    ];
    for proto in protos {
        println!("cargo:rerun-if-changed={proto}");
    }

    let file_descriptor_set = protox::compile(protos, ["proto"])?;

    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);
    std::fs::write(
        out_dir.join("descriptor.bin"),
        file_descriptor_set.encode_to_vec(),
    )?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(file_descriptor_set)?;

    Ok(())
}
