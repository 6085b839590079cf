use anyhow::Result;
use engine::{AnalysisEngine, AnalysisRequest};
use tracing::info;

use crate::cli::RequestArgs;
use crate::utils::{print_json, read_source};

fn request(args: &RequestArgs) -> Result<AnalysisRequest> {
    let mut request = AnalysisRequest::new(read_source(&args.input)?);
    if args.offline {
        request = request.offline();
    }
    if args.no_cache {
        request = request.without_cache();
    }
    if args.no_memory {
        request = request.without_memory();
    }
    Ok(request)
}

pub async fn run(engine: &AnalysisEngine, args: &RequestArgs) -> Result<()> {
    let result = engine.analyze(&request(args)?).await;
    info!(
        fingerprint = %result.fingerprint.short(),
        cached = result.cached,
        "Analyzed {}",
        args.input.display()
    );
    print_json(&result)
}

pub async fn run_annotate(engine: &AnalysisEngine, args: &RequestArgs) -> Result<()> {
    let annotation = engine.annotate(&request(args)?).await;
    info!(
        annotations = annotation.annotation_count,
        "Annotated {}",
        args.input.display()
    );
    print_json(&annotation)
}
