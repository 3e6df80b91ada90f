use std::process::ExitCode;

use shelld::config::Config;
use shelld::{Dispatcher, Server, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse_args();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not exist yet, so report on stderr directly.
            eprintln!("shelld: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), shelld::Error> {
    logging::init(&config.log)?;

    let addr = config.listen_addr()?;
    let server = Server::bind(addr).await?;

    tracing::info!(
        addr = %server.local_addr()?,
        script = %config.script.display(),
        "server started"
    );

    server.serve(Dispatcher::new(config.script)).await
}
