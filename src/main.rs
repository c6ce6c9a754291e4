//! relaycast 沙盒
//!
//! Usage:
//!     relaycast "GET /v1/models sk-test" "GET /admin" --step-logging

use anyhow::Context;
use clap::Parser;
use relaycast::{Gate, GateRequest, GateRules};
use relaycast_core::{default_config_path, load_config, logger};
use std::path::PathBuf;

const DEMO_REQUESTS: &[&str] = &[
    "GET /health",
    "GET /admin/users sk-demo",
    "GET /v1/models",
    "POST /v1/chat/completions sk-demo",
    "GET /v2/unknown sk-demo",
];

#[derive(Parser, Debug)]
#[command(name = "relaycast", version, about = "Request gate sandbox for the relaycast pipeline engine")]
struct Args {
    /// Config file (defaults to $RELAYCAST_CONFIG or the user config dir)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log every candidate step, overriding `step_logging.enabled`
    #[arg(long)]
    step_logging: bool,

    /// Requests as `METHOD PATH [api-key]`; a demo set is used when empty
    requests: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.display()))?;
    logger::init(&config.logging);

    let step_logging = if args.step_logging || config.step_logging.enabled {
        Some(config.step_logging.tracing_level()?)
    } else {
        None
    };
    let gate = Gate::new(GateRules::default(), step_logging)?;
    tracing::info!("[GATE] 闸门已就绪 step_logging={:?}", step_logging);

    let lines: Vec<String> = if args.requests.is_empty() {
        DEMO_REQUESTS.iter().map(|line| line.to_string()).collect()
    } else {
        args.requests
    };

    for line in &lines {
        let request = GateRequest::parse(line)?;
        let decision = gate.decide(request).await;
        println!("{line} => {decision}");
    }

    Ok(())
}
