#![forbid(unsafe_code)]

//! Binary entrypoint for the `skyferry` command line.

/// Runs the requested command and exits with its status code.
#[tokio::main]
async fn main() {
    let code = skyferry_app::run().await;
    if code != 0 {
        std::process::exit(code);
    }
}
