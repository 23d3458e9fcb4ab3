use std::process::ExitCode;

fn main() -> ExitCode {
    match vgg::cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");

            ExitCode::FAILURE
        }
    }
}
