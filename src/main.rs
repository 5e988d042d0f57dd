use console::style;
use perfexport::cli::Cli;
use perfexport::error::ExportError;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            let hint = err
                .chain()
                .find_map(|e| e.downcast_ref::<ExportError>())
                .and_then(ExportError::hint);
            if let Some(hint) = hint {
                eprintln!("{} {}", style("hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}
