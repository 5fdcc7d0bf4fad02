fn main() {
    // The prost-generated Rust for these protobufs is checked in under
    // src/proto_gen/ because this build environment has no `protoc`. Keep the
    // rerun hints so regeneration is triggered if the schemas change.
    println!("cargo:rerun-if-changed=src/protos/chromeos_update_engine/update_metadata.proto");
    println!("cargo:rerun-if-changed=src/protos/puffin/puffin.proto");

    // Windows-specific configuration
    #[cfg(target_os = "windows")]
    {
        // Configure static linking for xz2/lzma
        println!("cargo:rustc-link-search=/usr/x86_64-w64-mingw32/lib");
        println!("cargo:rustc-link-search=/usr/mingw64/lib");
        println!("cargo:rustc-link-lib=static=lzma");

        // Force static linking of C runtime
        println!("cargo:rustc-link-arg=-static-libgcc");
        println!("cargo:rustc-link-arg=-static-libstdc++");
    }
}
