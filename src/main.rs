fn main() {
    #[cfg(unix)]
    unsafe {
        // Avoid panics when piping output (e.g. `dbcli help | head`).
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    std::process::exit(dbcli::run(std::env::args().skip(1).collect()));
}
