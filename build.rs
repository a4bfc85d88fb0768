fn main() {
    println!("cargo:rerun-if-env-changed=MOTORNODE_CONFIG_JSON");

    // ESP-IDF link arguments are only needed for the device build; host
    // builds (tests, fuzzing) compile without the toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
