fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Packagers can pin the reported commit when building outside a git checkout
    println!("cargo:rerun-if-env-changed=GATEKEEPER_GIT_HASH");
    if let Ok(hash) = std::env::var("GATEKEEPER_GIT_HASH") {
        println!("cargo:rustc-env=GATEKEEPER_GIT_HASH={}", hash);
    }
}
