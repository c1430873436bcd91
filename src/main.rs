use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};

use charttable::{ChartExtractorBuilder, ChartInput, ReconstructionOptions};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn load(path: &Path) -> charttable::Result<ChartInput> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let paths = std::env::args_os().skip(1).map(PathBuf::from).collect::<Vec<_>>();
    if paths.is_empty() {
        eprintln!("usage: charttable <chart.json>...");
        return ExitCode::FAILURE;
    }

    let mut inputs = Vec::with_capacity(paths.len());
    for path in &paths {
        match load(path) {
            Ok(input) => inputs.push(input),
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    let options = ReconstructionOptions::default();
    let extractor = ChartExtractorBuilder::new().options(options).build();
    let start = Instant::now();
    let extractions = extractor.extract_batch(&inputs);
    log::debug!("{:?}", start.elapsed());

    let mut failed = false;
    for (path, extraction) in paths.iter().zip(&extractions) {
        let csv = extraction
            .as_ref()
            .map_err(|err| err.to_string())
            .and_then(|it| it.to_csv(options.csv_precision).map_err(|err| err.to_string()));
        match csv {
            Ok(csv) => println!("# {}\n{csv}", path.display()),
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
