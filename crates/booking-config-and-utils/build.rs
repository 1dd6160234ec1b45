fn main() {
    // Tell cargo to recompile when the compile-time API base URL changes.
    // Without this, option_env!() values get cached and won't update.
    println!("cargo:rerun-if-env-changed=BOOKING_API_BASE_URL");
}
