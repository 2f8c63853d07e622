//! docshift command-line entry point

fn main() {
    if let Err(e) = docshift::cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
