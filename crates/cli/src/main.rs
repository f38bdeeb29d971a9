use std::process::ExitCode;

fn main() -> ExitCode {
    gigboard_cli::run()
}
