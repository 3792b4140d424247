fn main() {
    println!("cargo:rerun-if-env-changed=JSONNET_LS_VERSION");
    if let Ok(version) = std::env::var("JSONNET_LS_VERSION") {
        println!("cargo:rustc-env=CARGO_PKG_VERSION={version}");
    }
}
