use anyhow::Result;
use callcount::{
    cli::Cli, config::CounterConfig, engine::CallCounter, namespace::Namespace, script::Script,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    // Configuration errors are fatal before anything is instrumented
    let config = CounterConfig::from_cli(&args)?;
    let script = Script::from_file(&config.script)?;

    let ns = Namespace::new();
    let counter = CallCounter::new(config.target.clone());
    let state = counter.attach(&ns);
    tracing::debug!(?state, statements = script.len(), "running host program");

    let outcome = script.run(&ns);

    // Report even when the host program failed
    println!("{}", counter.report().render(config.format));

    outcome
}
