use std::process::ExitCode;

fn main() -> ExitCode {
    match labelconv::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("labelconv: {err}");
            ExitCode::FAILURE
        }
    }
}
