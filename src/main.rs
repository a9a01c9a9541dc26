use anyhow::Result;
use std::sync::Arc;
use termframe::app::App;
use termframe::cli;
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    // Process CLI arguments first (before logging init for cleaner output)
    let runtime_options = match cli::process_cli() {
        cli::CliResult::Exit(code) => {
            if code == 0 {
                return Ok(());
            }
            std::process::exit(code);
        }
        cli::CliResult::Continue(options) => options,
    };
    // Routes log::info!() etc. to the debug log file; mirrors to stderr when
    // RUST_LOG is set. --log-level takes precedence over RUST_LOG.
    termframe::debug::init_log_bridge(runtime_options.log_level);

    log::info!("Starting termframe");

    // GPU adapter and device requests are async
    let runtime = Arc::new(Runtime::new()?);

    let app = App::new(Arc::clone(&runtime), runtime_options)?;
    let result = app.run();

    log::info!("Frames done, shutting down runtime");
    if let Some(rt) = Arc::try_unwrap(runtime).ok() {
        rt.shutdown_timeout(std::time::Duration::from_secs(2));
    }

    match result {
        Ok(summary) => {
            println!("{summary}");
            Ok(())
        }
        Err(e) => {
            eprintln!("termframe: error: {e:#}");
            Err(e)
        }
    }
}
