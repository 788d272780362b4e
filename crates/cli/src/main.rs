use std::process::ExitCode;

fn main() -> ExitCode {
    mendflow_cli::run()
}
