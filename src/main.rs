use log::error;
use longbox::identify::{self, ResultSink};
use longbox::rank::ranked_results;
use longbox::{Config, IdentifyRequest, Session};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const USAGE: &str = "usage: longbox [t:<title>] [a:<authors>] [i:<idtype>:<id>] [--verbose]";

fn parse_args(args: &[String]) -> Option<(IdentifyRequest, bool)> {
    let mut request = IdentifyRequest::default();
    let mut verbose = false;
    for arg in args {
        if let Some(title) = arg.strip_prefix("t:") {
            request.title = Some(title.to_string());
        } else if let Some(authors) = arg.strip_prefix("a:") {
            request
                .authors
                .extend(authors.split('&').map(|a| a.trim().to_string()));
        } else if let Some(identifier) = arg.strip_prefix("i:") {
            let (idtype, id) = identifier.split_once(':')?;
            request
                .identifiers
                .insert(idtype.to_string(), id.to_string());
        } else if arg == "--verbose" || arg == "-v" {
            verbose = true;
        } else {
            return None;
        }
    }
    Some((request, verbose))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((request, verbose)) = parse_args(&args) else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = Config::load();
    let session = match Session::connect(config).await {
        Ok(session) => session,
        Err(e) => {
            error!("failed to start session: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let sink = Arc::new(ResultSink::new());
    let abort = Arc::new(AtomicBool::new(false));
    if let Err(e) = identify::identify(&session, &request, &sink, &abort).await {
        error!("identify failed: {}", e);
        return ExitCode::FAILURE;
    }

    let ranked = ranked_results(
        sink.take(),
        request.title.as_deref(),
        &request.authors,
        &request.identifiers,
    );
    if ranked.is_empty() {
        println!("no matches");
        return ExitCode::SUCCESS;
    }
    for result in ranked {
        let pubdate = result
            .metadata
            .pubdate
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        println!(
            "({:04}) - {}: {} [{}]",
            result.score,
            result.metadata.identifier("comicvine").unwrap_or("?"),
            result.metadata.title,
            pubdate
        );
    }
    ExitCode::SUCCESS
}
