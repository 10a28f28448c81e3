fn main() {
    // The shell is optional; library and test builds need no codegen.
    #[cfg(feature = "desktop")]
    tauri_build::build();
}
