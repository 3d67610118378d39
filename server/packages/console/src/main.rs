fn main() {
    if let Err(err) = agent_console::cli::run_console() {
        tracing::error!(error = %err, "agent-console failed");
        std::process::exit(1);
    }
}
