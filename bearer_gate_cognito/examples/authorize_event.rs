use std::{io::Read, time::Duration};

use bearer_gate::AuthorizerRequest;
use bearer_gate_cognito::Settings;
use clap::Parser;

/// Reads an authorizer event from stdin and prints the decision
#[derive(Debug, Parser)]
struct Opts {
    #[command(flatten)]
    settings: Settings,

    /// Refresh the key set in the background on this interval, in seconds
    #[arg(long, env)]
    refresh_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let authorizer = opts.settings.into_authorizer()?;

    if let Some(secs) = opts.refresh_interval_secs {
        authorizer
            .verifier()
            .keys()
            .spawn_refresh(Duration::from_secs(secs));
    }

    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    let request: AuthorizerRequest = serde_json::from_str(&raw)?;

    let decision = authorizer.handle(&request).await;
    println!("{}", serde_json::to_string_pretty(&decision)?);

    Ok(())
}
