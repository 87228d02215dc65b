use std::process::ExitCode;

fn main() -> ExitCode {
    leadpipe_cli::run()
}
