use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use std::process::ExitCode;
use std::sync::Arc;

use seedling::construct::StoreConstructor;
use seedling::document::FileSource;
use seedling::element::RootConfig;
use seedling::error::Result;
use seedling::execute::Runner;
use seedling::model::Schema;
use seedling::persist::SqliteStore;
use seedling::settings::Settings;

fn main() -> ExitCode {
    let path = std::env::args().nth(1);
    let settings = match Settings::load(path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();
    match seed(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn seed(settings: &Settings) -> Result<()> {
    let schema = Arc::new(Schema::from_file(&settings.schema)?);
    info!(document = %settings.document.display(), "building document");
    let mut root = RootConfig::from_source(&FileSource(settings.document.clone()), schema.clone())?;
    let store = SqliteStore::open(&settings.persistence(), schema.clone())?;
    let mut constructor = StoreConstructor::new(schema, store, settings.session);
    let summary = {
        let mut runner = match settings.seed {
            Some(seed) => Runner::with_seed(seed),
            None => Runner::new(),
        }
        .with_progress_interval(settings.progress_interval());
        runner.attach(&mut constructor).run(&mut root)?
    };
    info!(
        entities = summary.entities,
        loads = summary.loads,
        loads_bound = summary.loads_bound,
        iterations = summary.iterations,
        saved = constructor.store().saved_count(),
        "seeding finished"
    );
    Ok(())
}
