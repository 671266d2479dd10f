use anyhow::Context;
use clap::Parser;
use embed_consent::config::cli::{HeadlessManager, RunReport};
use embed_consent::utils::{logger, validation::Validate};
use embed_consent::{CliArgs, TomlConfig};

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }
    args.validate()?;

    tracing::info!("Loading configuration from: {}", args.config);
    let config = TomlConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config file '{}'", args.config))?;
    config.validate().context("configuration validation failed")?;

    let (dom, cookies, events) = config.page_runtime();
    let mut manager = HeadlessManager::new(dom, cookies, events);
    manager.run(config.to_manager_config())?;

    for name in &args.accept {
        manager.accept_service(name.as_str());
    }
    for name in &args.reject {
        manager.reject_service(name.as_str());
    }
    if args.reveal {
        manager.reveal_all();
    }

    let report = RunReport::collect(&manager);
    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);

    tracing::info!(
        "Done: {} of {} service(s) accepted",
        report.state.accepted_services.len(),
        report.state.services.len()
    );
    Ok(())
}
