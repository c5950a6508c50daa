fn main() {
    if let Err(err) = worktimer_lib::run() {
        eprintln!("worktimer: {err:#}");
        std::process::exit(1);
    }
}
