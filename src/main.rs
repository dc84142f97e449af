fn main() {
    if let Err(err) = mesa_analytics::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
