use std::process::ExitCode;

fn main() -> ExitCode {
    match wardline_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Wardline stopped: {e}");
            ExitCode::FAILURE
        }
    }
}
