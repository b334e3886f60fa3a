pub fn main() {
    println!("cargo:rerun-if-env-changed=VERSION");

    if let Ok(version) = std::env::var("VERSION") {
        println!("cargo:rustc-env=SAM_VALIDATE_VERSION={}", version);
    } else {
        println!(
            "cargo:rustc-env=SAM_VALIDATE_VERSION={}",
            env!("CARGO_PKG_VERSION")
        );
    }
}
