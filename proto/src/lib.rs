//! Generated gRPC stubs for the desktop automation service.
//!
//! The `.proto` sources live under `proto/` in this crate; `build.rs`
//! compiles them with `protox` + `tonic-build`. Vendored copies of
//! `google.rpc` and `google.longrunning` are included so the standard
//! Operations service and structured error details compile without a
//! `googleapis` checkout.

pub mod google {
    pub mod rpc {
        tonic::include_proto!("google.rpc");
    }

    pub mod longrunning {
        tonic::include_proto!("google.longrunning");
    }
}

pub mod macosusesdk {
    pub mod v1 {
        tonic::include_proto!("macosusesdk.v1");
    }
}

/// Encoded `FileDescriptorSet` for every compiled proto file. The server
/// feeds this to the gRPC reflection service.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/descriptor.bin"));
