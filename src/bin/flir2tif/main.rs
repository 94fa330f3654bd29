mod args;

use anyhow::{bail, Result};
use flir_geotiff::{
    cli::{init_logging, progress_bar, read_input_records},
    LocalCatalog, Pipeline,
};
use serde_json::json;
use tracing::error;

use crate::args::Args;

fn main() -> Result<()> {
    let args = Args::from_cmd_line()?;
    init_logging(args.verbosity);

    let mut inputs = vec![];
    for path in &args.inputs {
        inputs.extend(read_input_records(path)?);
    }

    let catalog = LocalCatalog::new(&args.config.catalog_root);
    let pipeline = Pipeline::new(args.config, catalog);

    let bar = progress_bar(inputs.len());
    let mut results = Vec::with_capacity(inputs.len());
    let mut failed = 0usize;
    for input in &inputs {
        let result = match pipeline.run(input, args.params) {
            Ok(outcome) => json!({ "id": input.id, "outcome": outcome }),
            Err(e) => {
                let e = anyhow::Error::from(e);
                error!(resource = %input.id, "{:#}", e);
                failed += 1;
                json!({ "id": input.id, "error": format!("{:#}", e) })
            }
        };
        results.push(result);
        bar.inc(1);
    }
    bar.finish_and_clear();

    let processed = results
        .iter()
        .filter(|r| matches!(r.get("outcome"), Some(o) if o.get("processed").is_some()))
        .count();
    println!("{}", serde_json::to_string_pretty(&results)?);
    eprintln!(
        "Processed {} of {} inputs, {} failed",
        processed,
        inputs.len(),
        failed
    );

    if failed > 0 {
        bail!("{} of {} inputs failed", failed, inputs.len());
    }
    Ok(())
}
