// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    env_logger::init();

    if let Err(e) = proctordesk_lib::run() {
        eprintln!("Error running application: {}", e);
        std::process::exit(1);
    }
}
